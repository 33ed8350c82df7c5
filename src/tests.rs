use super::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {} but got {}",
        expected,
        actual
    );
}

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}

#[test]
fn symbol_table_indices_are_injective_and_dense() {
    let mut table = SymbolTable::new();
    assert_eq!(table.intern_species("A"), 0);
    assert_eq!(table.intern_species("B"), 1);
    assert_eq!(table.intern_species("A"), 0);
    assert_eq!(table.intern_parameter("k"), 0);
    assert_eq!(table.intern_parameter("K"), 1);
    assert_eq!(table.n_species(), 2);
    assert_eq!(table.n_params(), 2);

    let species_indices: Vec<usize> = table
        .species_names()
        .iter()
        .map(|name| table.species_index(name).unwrap())
        .collect();
    assert_eq!(species_indices, vec![0, 1]);
    assert_eq!(table.species_index("missing"), None);
}

#[test]
fn expression_arithmetic_and_precedence() {
    let table = SymbolTable::new();
    let term = parse_expression("1 + 2*3 ^ 2", &table).unwrap();
    assert_close(term.evaluate(&[], &[], 0.0), 19.0);
    let term = parse_expression("(1 + 2) * 3", &table).unwrap();
    assert_close(term.evaluate(&[], &[], 0.0), 9.0);
}

#[test]
fn expression_round_trip_species_and_parameter() {
    let (species, params) = analyze("2*x + exp(_k)").unwrap();
    assert_eq!(species, vec!["x".to_string()]);
    assert_eq!(params, vec!["k".to_string()]);

    let mut table = SymbolTable::new();
    table.intern_species("x");
    table.intern_parameter("k");
    let term = parse_expression("2*x + exp(_k)", &table).unwrap();
    assert_close(term.evaluate(&[3.0], &[0.0], 0.0), 7.0);
}

#[test]
fn expression_pipe_marker_matches_underscore_prefix() {
    let (species, params) = analyze("|kb * S").unwrap();
    assert_eq!(species, vec!["S".to_string()]);
    assert_eq!(params, vec!["kb".to_string()]);
}

#[test]
fn expression_volume_and_time_keywords() {
    let table = SymbolTable::new();
    let term = parse_expression("volume * t", &table).unwrap();
    assert_close(term.volume_evaluate(&[], &[], 2.0, 5.0), 10.0);
    // evaluate is volume_evaluate with a unit volume
    assert_close(term.evaluate(&[], &[], 5.0), 5.0);
}

#[test]
fn expression_evaluate_equals_unit_volume_evaluate() {
    let mut table = SymbolTable::new();
    table.intern_species("x");
    table.intern_parameter("k");
    let term =
        parse_expression("2*x/volume + heaviside(x - 4)*Max(x, _k, 10)", &table).unwrap();
    let state = [6.0];
    let params = [25.0];
    assert_close(
        term.evaluate(&state, &params, 1.5),
        term.volume_evaluate(&state, &params, 1.0, 1.5),
    );
}

#[test]
fn expression_function_catalog() {
    let table = SymbolTable::new();
    let eval = |rate: &str| {
        parse_expression(rate, &table)
            .unwrap()
            .evaluate(&[], &[], 0.0)
    };
    assert_close(eval("heaviside(0)"), 1.0);
    assert_close(eval("heaviside(-1)"), 0.0);
    assert_close(eval("abs(-2.5)"), 2.5);
    assert_close(eval("log(e)"), 1.0);
    assert_close(eval("exp(0)"), 1.0);
    assert_close(eval("Max(1, 3, 2)"), 3.0);
    assert_close(eval("Min(4, -1)"), -1.0);
    assert_close(eval("Max(7)"), 7.0);
    assert_close(eval("2*pi"), 2.0 * std::f64::consts::PI);
}

#[test]
fn expression_subtraction_and_division_rewrite() {
    let mut table = SymbolTable::new();
    table.intern_species("a");
    table.intern_species("b");
    let term = parse_expression("a - b", &table).unwrap();
    assert_close(term.evaluate(&[7.0, 2.0], &[], 0.0), 5.0);
    let term = parse_expression("a / b", &table).unwrap();
    assert_close(term.evaluate(&[7.0, 2.0], &[], 0.0), 3.5);
    let term = parse_expression("-a", &table).unwrap();
    assert_close(term.evaluate(&[7.0, 2.0], &[], 0.0), -7.0);
}

#[test]
fn expression_rejects_unparseable_rates() {
    assert!(matches!(
        analyze("2*+"),
        Err(ModelError::UnparseableRate { .. })
    ));
    assert!(matches!(
        analyze("sin(x)"),
        Err(ModelError::UnparseableRate { .. })
    ));
    assert!(matches!(
        analyze("1e999"),
        Err(ModelError::UnparseableRate { .. })
    ));
}

#[test]
fn expression_dependencies_are_sorted_and_unique() {
    let mut table = SymbolTable::new();
    table.intern_species("x");
    table.intern_species("y");
    let term = parse_expression("y + x*y + exp(x)", &table).unwrap();
    assert_eq!(term.dependencies(), vec![0, 1]);
}

#[test]
fn constitutive_reaction_from_document() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="--X">
               <propensity type="massaction" k="2.0"/>
               <delay type="none"/>
             </reaction>
           </model>"#,
    )
    .unwrap();
    assert_eq!(model.species_list(), ["X".to_string()].as_slice());
    let reaction = &model.reactions()[0];
    assert!(matches!(reaction.propensity, Propensity::Constitutive { .. }));

    let state = [0.0];
    let params = model.param_values();
    assert_close(reaction.propensity.get_propensity(&state, params, 0.0), 2.0);
    assert_close(
        reaction
            .propensity
            .get_volume_propensity(&state, params, 3.0, 0.0),
        6.0,
    );
    assert_eq!(model.update_array(), vec![vec![1]]);
}

#[test]
fn massaction_specializes_by_operand_count() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="A --">
               <propensity type="massaction" k="1.0" species="A"/>
               <delay type="none"/>
             </reaction>
             <reaction text="A + B -- C">
               <propensity type="massaction" k="1.0" species="A*B"/>
               <delay type="none"/>
             </reaction>
             <reaction text="A + B + C --">
               <propensity type="massaction" k="1.0" species="A*B*C"/>
               <delay type="none"/>
             </reaction>
           </model>"#,
    )
    .unwrap();
    assert!(matches!(
        model.reactions()[0].propensity,
        Propensity::Unimolecular { .. }
    ));
    assert!(matches!(
        model.reactions()[1].propensity,
        Propensity::Bimolecular { .. }
    ));
    assert!(matches!(
        model.reactions()[2].propensity,
        Propensity::MassAction { .. }
    ));
}

#[test]
fn hill_positive_propensity_behaves() {
    let mut table = SymbolTable::new();
    let propensity = Propensity::from_fields(
        "hillpositive",
        &fields(&[("k", "kmax"), ("s1", "X"), ("K", "K"), ("n", "n")]),
        &mut table,
    )
    .unwrap();

    let mut params = vec![0.0; table.n_params()];
    params[table.param_index("kmax").unwrap()] = 10.0;
    params[table.param_index("K").unwrap()] = 5.0;
    params[table.param_index("n").unwrap()] = 2.0;

    assert_close(propensity.get_propensity(&[5.0], &params, 0.0), 5.0);
    assert_close(propensity.get_propensity(&[0.0], &params, 0.0), 0.0);
    let saturated = propensity.get_propensity(&[1e12], &params, 0.0);
    assert!((saturated - 10.0).abs() < 1e-6);

    // concentration form: counts are divided by the volume
    assert_close(
        propensity.get_volume_propensity(&[10.0], &params, 2.0, 0.0),
        propensity.get_propensity(&[5.0], &params, 0.0),
    );
}

#[test]
fn proportional_hill_keeps_counts_for_d() {
    let mut table = SymbolTable::new();
    let propensity = Propensity::from_fields(
        "proportionalhillnegative",
        &fields(&[
            ("k", "2.0"),
            ("d", "D"),
            ("s1", "X"),
            ("K", "1.0"),
            ("n", "1.0"),
        ]),
        &mut table,
    )
    .unwrap();
    let mut params = vec![0.0; table.n_params()];
    for &(idx, value) in table.literal_values() {
        params[idx] = value;
    }
    let d = table.species_index("D").unwrap();
    let x = table.species_index("X").unwrap();
    let mut state = [0.0; 2];
    state[d] = 3.0;
    state[x] = 1.0;
    // k * d / (1 + x/K) with x unscaled
    assert_close(propensity.get_propensity(&state, &params, 0.0), 3.0);
    // with V=2 only x rescales: k * d / (1 + 0.5) = 4
    assert_close(propensity.get_volume_propensity(&state, &params, 2.0, 0.0), 4.0);
}

#[test]
fn bimolecular_volume_scaling_law() {
    let mut table = SymbolTable::new();
    let propensity = Propensity::from_fields(
        "bimolecular",
        &fields(&[("k", "2.0"), ("species", "A*B")]),
        &mut table,
    )
    .unwrap();
    let mut params = vec![0.0; table.n_params()];
    for &(idx, value) in table.literal_values() {
        params[idx] = value;
    }
    let state = [3.0, 4.0];
    let plain = propensity.get_propensity(&state, &params, 0.0);
    assert_close(plain, 24.0);
    for volume in [0.5, 1.0, 2.0, 7.5] {
        assert_close(
            propensity.get_volume_propensity(&state, &params, volume, 0.0),
            plain / volume,
        );
    }
}

#[test]
fn massaction_volume_power_law() {
    let mut table = SymbolTable::new();
    let propensity = Propensity::from_fields(
        "massaction",
        &fields(&[("k", "1.5"), ("species", "A*B*C")]),
        &mut table,
    )
    .unwrap();
    let mut params = vec![0.0; table.n_params()];
    for &(idx, value) in table.literal_values() {
        params[idx] = value;
    }
    let state = [2.0, 3.0, 4.0];
    let plain = propensity.get_propensity(&state, &params, 0.0);
    assert_close(plain, 36.0);
    let volume = 2.0;
    let scaled = propensity.get_volume_propensity(&state, &params, volume, 0.0);
    assert_close(scaled * volume.powi(2), plain);
}

#[test]
fn catalog_propensities_are_nonnegative() {
    let mut table = SymbolTable::new();
    let shapes = [
        Propensity::from_fields("constitutive", &fields(&[("k", "0.7")]), &mut table).unwrap(),
        Propensity::from_fields(
            "unimolecular",
            &fields(&[("k", "0.3"), ("species", "A")]),
            &mut table,
        )
        .unwrap(),
        Propensity::from_fields(
            "hillnegative",
            &fields(&[("k", "2.0"), ("s1", "A"), ("K", "1.0"), ("n", "4.0")]),
            &mut table,
        )
        .unwrap(),
    ];
    let mut params = vec![0.0; table.n_params()];
    for &(idx, value) in table.literal_values() {
        params[idx] = value;
    }
    for state in [[0.0], [1.0], [250.0]] {
        for propensity in &shapes {
            assert!(propensity.get_propensity(&state, &params, 0.0) >= 0.0);
            assert!(propensity.get_volume_propensity(&state, &params, 2.0, 0.0) >= 0.0);
        }
    }
}

#[test]
fn massaction_species_product_rejects_sums() {
    let mut table = SymbolTable::new();
    let err = Propensity::from_fields(
        "massaction",
        &fields(&[("k", "1.0"), ("species", "A+B")]),
        &mut table,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::InvalidStoichiometry(_)));
}

#[test]
fn propensity_binding_errors() {
    let mut table = SymbolTable::new();
    let err = Propensity::from_fields(
        "hillpositive",
        &fields(&[("k", "1.0"), ("s1", "X"), ("K", "5.0")]),
        &mut table,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::MalformedReaction(msg) if msg.contains("'n'")));

    let err = Propensity::from_fields("gompertz", &fields(&[]), &mut table).unwrap_err();
    assert!(matches!(err, ModelError::UnknownPropensityType(kind) if kind == "gompertz"));
}

#[test]
fn propensity_discovery_needs_no_table() {
    let (species, params) = Propensity::species_and_parameters(
        "proportionalhillpositive",
        &fields(&[
            ("k", "k1"),
            ("d", "D"),
            ("s1", "X"),
            ("K", "2.0"),
            ("n", "n1"),
        ]),
    )
    .unwrap();
    assert_eq!(species, vec!["D".to_string(), "X".to_string()]);
    assert_eq!(params, vec!["k1".to_string(), "n1".to_string()]);
}

#[test]
fn delay_variants_sample_expected_values() {
    let mut table = SymbolTable::new();
    let fixed = Delay::from_fields("fixed", &fields(&[("delay", "tau")]), &mut table).unwrap();
    let gaussian = Delay::from_fields(
        "gaussian",
        &fields(&[("mean", "mu"), ("std", "0.0")]),
        &mut table,
    )
    .unwrap();
    let gamma = Delay::from_fields(
        "gamma",
        &fields(&[("k", "2.0"), ("theta", "3.0")]),
        &mut table,
    )
    .unwrap();

    let mut params = vec![0.0; table.n_params()];
    for &(idx, value) in table.literal_values() {
        params[idx] = value;
    }
    params[table.param_index("tau").unwrap()] = 5.5;
    params[table.param_index("mu").unwrap()] = 4.0;

    let mut rng = rng();
    assert_close(Delay::None.sample(&[], &params, &mut rng), 0.0);
    assert_close(fixed.sample(&[], &params, &mut rng), 5.5);
    assert_close(gaussian.sample(&[], &params, &mut rng), 4.0);
    let drawn = gamma.sample(&[], &params, &mut rng);
    assert!(drawn.is_finite() && drawn >= 0.0);
}

#[test]
fn delay_binding_errors() {
    let mut table = SymbolTable::new();
    let err = Delay::from_fields("gamma", &fields(&[("k", "2.0")]), &mut table).unwrap_err();
    assert!(matches!(err, ModelError::MalformedReaction(msg) if msg.contains("'theta'")));
    let err = Delay::from_fields("weibull", &fields(&[]), &mut table).unwrap_err();
    assert!(matches!(err, ModelError::UnknownDelayType(kind) if kind == "weibull"));
}

#[test]
fn additive_rule_sums_species() {
    let mut table = SymbolTable::new();
    let rule = Rule::from_equation("additive", "repeated", "total = A + B", &mut table).unwrap();
    let mut state = vec![0.0; table.n_species()];
    state[table.species_index("A").unwrap()] = 2.0;
    state[table.species_index("B").unwrap()] = 3.0;
    let mut params = vec![];
    rule.apply(&mut state, &mut params, 0.0);
    assert_close(state[table.species_index("total").unwrap()], 5.0);
}

#[test]
fn assignment_rule_can_target_parameters() {
    let mut table = SymbolTable::new();
    let rule =
        Rule::from_equation("assignment", "repeated", "_ktot = 2*A + t", &mut table).unwrap();
    assert!(matches!(
        rule,
        Rule::GeneralAssignment {
            target: RuleTarget::Parameter(_),
            ..
        }
    ));
    let mut state = vec![1.0];
    let mut params = vec![0.0];
    rule.apply(&mut state, &mut params, 3.0);
    assert_close(params[table.param_index("ktot").unwrap()], 5.0);
}

#[test]
fn repeated_rules_apply_in_declaration_order() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="A --">
               <propensity type="massaction" k="1.0" species="A"/>
               <delay type="none"/>
             </reaction>
             <rule type="assignment" frequency="repeated" equation="B = A"/>
             <rule type="assignment" frequency="repeated" equation="C = B"/>
             <species name="A" value="1"/>
             <species name="B" value="0"/>
             <species name="C" value="0"/>
           </model>"#,
    )
    .unwrap();
    let mut state = model.species_values().to_vec();
    let mut params = model.param_values().to_vec();
    model.apply_repeated_rules(&mut state, &mut params, 0.0);
    // the second rule sees the first rule's write
    assert_close(state[model.species_index("B").unwrap()], 1.0);
    assert_close(state[model.species_index("C").unwrap()], 1.0);
}

#[test]
fn rule_frequency_and_kind_are_checked() {
    let mut table = SymbolTable::new();
    let err = Rule::from_equation("assignment", "once", "A = 1", &mut table).unwrap_err();
    assert!(matches!(err, ModelError::UnsupportedRuleFrequency(freq) if freq == "once"));
    let err = Rule::from_equation("algebraic", "repeated", "A = 1", &mut table).unwrap_err();
    assert!(matches!(err, ModelError::UnknownRuleType(_)));
    let err = Rule::from_equation("assignment", "repeated", "A + 1", &mut table).unwrap_err();
    assert!(matches!(err, ModelError::MalformedReaction(_)));
}

#[test]
fn stochastic_time_threshold_division_is_presampled() {
    let mut volume_model = CellVolume::stochastic_time_threshold(33.0, 2.0, 0.0);
    let mut rng = rng();
    volume_model
        .initialize(&[], &[], 0.0, 1.0, &mut rng)
        .unwrap();

    // noise 0: division exactly one cycle after starting at half the
    // division volume
    let CellVolume::StochasticTimeThreshold {
        division_time,
        growth_rate,
        ..
    } = &volume_model
    else {
        panic!("wrong variant");
    };
    assert!((*division_time - 33.0).abs() < 1e-9);
    assert_close(
        volume_model.get_volume_step(&[], &[], 0.0, 1.0, 0.1),
        *growth_rate * 0.1,
    );
    assert!(volume_model.cell_divided(&[], &[], 33.0, 1.9, 0.1));
    assert!(!volume_model.cell_divided(&[], &[], 32.8, 1.9, 0.1));
}

#[test]
fn state_dependent_volume_divides_past_threshold() {
    let mut table = SymbolTable::new();
    table.intern_species("X");
    let growth = parse_expression("0.1*X", &table).unwrap();
    let mut volume_model = CellVolume::state_dependent(5.0, 0.0, growth);
    let mut rng = rng();
    volume_model
        .initialize(&[2.0], &[], 0.0, 1.0, &mut rng)
        .unwrap();

    assert_close(volume_model.get_volume_step(&[2.0], &[], 0.0, 1.0, 0.5), 0.1);
    assert!(!volume_model.cell_divided(&[2.0], &[], 1.0, 4.9, 0.5));
    assert!(volume_model.cell_divided(&[2.0], &[], 1.0, 5.1, 0.5));
}

#[test]
fn state_dependent_volume_rejects_impossible_division() {
    let table = SymbolTable::new();
    let growth = parse_expression("1.0", &table).unwrap();
    let mut volume_model = CellVolume::state_dependent(1.0, 0.0, growth);
    let mut rng = rng();
    let err = volume_model
        .initialize(&[], &[], 0.0, 2.0, &mut rng)
        .unwrap_err();
    assert!(matches!(err, ModelError::ImpossibleDivision { .. }));
}

#[test]
fn volume_models_deep_copy_for_daughters() {
    let mut mother = CellVolume::stochastic_time_threshold(30.0, 2.0, 0.0);
    let mut rng = rng();
    mother.initialize(&[], &[], 0.0, 1.0, &mut rng).unwrap();
    let mut daughter = mother.clone();
    daughter.initialize(&[], &[], 30.0, 1.0, &mut rng).unwrap();
    // re-initializing the copy must not disturb the mother's schedule
    assert!(mother.cell_divided(&[], &[], 30.0, 1.0, 0.1));
    assert!(!daughter.cell_divided(&[], &[], 30.0, 1.0, 0.1));
    assert!(daughter.cell_divided(&[], &[], 60.0, 1.0, 0.1));
}

#[test]
fn gene_expression_network_balances_at_steady_state() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="-- mRNA">
               <propensity type="massaction" k="beta"/>
               <delay type="none"/>
             </reaction>
             <reaction text="mRNA --">
               <propensity type="massaction" k="delta_m" species="mRNA"/>
               <delay type="none"/>
             </reaction>
             <reaction text="mRNA -- mRNA + protein">
               <propensity type="massaction" k="k_tl" species="mRNA"/>
               <delay type="none"/>
             </reaction>
             <reaction text="protein --">
               <propensity type="massaction" k="delta_p" species="protein"/>
               <delay type="none"/>
             </reaction>
             <parameter name="beta" value="2.0"/>
             <parameter name="delta_m" value="0.2"/>
             <parameter name="k_tl" value="5.0"/>
             <parameter name="delta_p" value="0.05"/>
             <species name="mRNA" value="0"/>
             <species name="protein" value="0"/>
           </model>"#,
    )
    .unwrap();

    // deterministic steady state: mRNA = beta/delta_m, protein = k_tl*mRNA/delta_p
    let mut state = vec![0.0; model.n_species()];
    state[model.species_index("mRNA").unwrap()] = 10.0;
    state[model.species_index("protein").unwrap()] = 1000.0;
    let params = model.param_values();

    let propensities: Vec<f64> = model
        .reactions()
        .iter()
        .map(|r| r.propensity.get_propensity(&state, params, 0.0))
        .collect();
    assert_close(propensities[0], propensities[1]);
    assert_close(propensities[2], propensities[3]);
    assert_close(propensities[0], 2.0);
    assert_close(propensities[2], 50.0);

    // translation leaves mRNA unchanged and makes one protein
    let update = model.update_array();
    let m = model.species_index("mRNA").unwrap();
    let p = model.species_index("protein").unwrap();
    assert_eq!(update[m][2], 0);
    assert_eq!(update[p][2], 1);
}

#[test]
fn unspecified_parameters_are_all_reported() {
    let err = Model::from_xml_str(
        r#"<model>
             <reaction text="-- X">
               <propensity type="massaction" k="beta"/>
               <delay type="fixed" delay="tau"/>
             </reaction>
           </model>"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, ModelError::UnspecifiedParameter(ref msg) if msg.contains("beta") && msg.contains("tau"))
    );
}

#[test]
fn set_values_round_trip_and_reject_unknown_names() {
    let mut model = Model::from_xml_str(
        r#"<model>
             <reaction text="X --">
               <propensity type="massaction" k="kd" species="X"/>
               <delay type="none"/>
             </reaction>
             <parameter name="kd" value="1.0"/>
             <species name="X" value="4"/>
           </model>"#,
    )
    .unwrap();

    model
        .set_params(&HashMap::from([("kd".to_string(), 7.0)]))
        .unwrap();
    assert_close(model.param_value("kd").unwrap(), 7.0);
    model
        .set_species(&HashMap::from([("X".to_string(), 9.0)]))
        .unwrap();
    assert_close(model.species_value("X").unwrap(), 9.0);

    let err = model
        .set_params(&HashMap::from([("nope".to_string(), 1.0)]))
        .unwrap_err();
    assert!(matches!(err, ModelError::Lookup(name) if name == "nope"));
    assert_eq!(model.param_index("nope"), None);
}

#[test]
fn general_propensity_and_expression_surface() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="G -- G + M">
               <propensity type="general" rate="_ktx*G/(1 + G)"/>
               <delay type="none"/>
             </reaction>
             <parameter name="ktx" value="3.0"/>
             <species name="G" value="1"/>
           </model>"#,
    )
    .unwrap();
    let mut state = vec![0.0; model.n_species()];
    state[model.species_index("G").unwrap()] = 1.0;
    let value = model.reactions()[0]
        .propensity
        .get_propensity(&state, model.param_values(), 0.0);
    assert_close(value, 1.5);

    let term = model.parse_general_expression("M + _ktx").unwrap();
    assert_close(term.evaluate(&state, model.param_values(), 0.0), 3.0);
    let err = model.parse_general_expression("stranger").unwrap_err();
    assert!(matches!(err, ModelError::Lookup(name) if name == "stranger"));
}

#[test]
fn delayed_stoichiometry_lands_in_the_delay_matrix() {
    let model = Model::from_xml_str(
        r#"<model>
             <reaction text="A --" after="-- B">
               <propensity type="massaction" k="kf" species="A"/>
               <delay type="fixed" delay="tau"/>
             </reaction>
             <parameter name="kf" value="1.0"/>
             <parameter name="tau" value="5.0"/>
             <species name="A" value="10"/>
           </model>"#,
    )
    .unwrap();
    let a = model.species_index("A").unwrap();
    let b = model.species_index("B").unwrap();
    assert_eq!(model.update_array()[a][0], -1);
    assert_eq!(model.update_array()[b][0], 0);
    assert_eq!(model.delay_update_array()[b][0], 1);
    assert_eq!(model.delay_update_array()[a][0], 0);

    let mut rng = rng();
    let drawn = model.reactions()[0]
        .delay
        .sample(model.species_values(), model.param_values(), &mut rng);
    assert_close(drawn, 5.0);
}

#[test]
fn document_structure_is_validated() {
    let err = Model::from_xml_str("<mixture/>").unwrap_err();
    assert!(matches!(err, ModelError::Xml(_)));

    let err = Model::from_xml_str(
        r#"<model><reaction text="A --"><delay type="none"/></reaction></model>"#,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::MalformedReaction(msg) if msg.contains("propensity")));

    let err = Model::from_xml_str(
        r#"<model>
             <reaction text="A --">
               <propensity type="spline" k="1"/>
               <delay type="none"/>
             </reaction>
           </model>"#,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::UnknownPropensityType(kind) if kind == "spline"));

    let err = Model::from_xml_str(
        r#"<model>
             <reaction text="A to B">
               <propensity type="massaction" k="1.0" species="A"/>
               <delay type="none"/>
             </reaction>
           </model>"#,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::MalformedReaction(msg) if msg.contains("--")));
}

#[test]
fn sbml_import_produces_equivalent_model() {
    let model = Model::from_sbml_str(
        r#"<sbml xmlns="http://www.sbml.org/sbml/level3/version2/core" level="3" version="2">
             <model id="mm">
               <listOfCompartments>
                 <compartment id="cell" size="1"/>
               </listOfCompartments>
               <listOfSpecies>
                 <species id="S" initialAmount="10"/>
                 <species id="P" initialConcentration="2.5"/>
               </listOfSpecies>
               <listOfParameters>
                 <parameter id="kcat" value="1.5"/>
                 <parameter id="Km" value="4"/>
               </listOfParameters>
               <listOfReactions>
                 <reaction id="conv" reversible="false">
                   <listOfReactants>
                     <speciesReference species="S" stoichiometry="1"/>
                   </listOfReactants>
                   <listOfProducts>
                     <speciesReference species="P"/>
                   </listOfProducts>
                   <kineticLaw>
                     <math xmlns="http://www.w3.org/1998/Math/MathML">
                       <apply>
                         <divide/>
                         <apply><times/><ci>kcat</ci><ci>S</ci></apply>
                         <apply><plus/><ci>Km</ci><ci>S</ci></apply>
                       </apply>
                     </math>
                   </kineticLaw>
                 </reaction>
               </listOfReactions>
             </model>
           </sbml>"#,
    )
    .unwrap();

    assert_close(model.species_value("S").unwrap(), 10.0);
    assert_close(model.species_value("P").unwrap(), 2.5);
    assert_close(model.param_value("kcat").unwrap(), 1.5);
    assert!(matches!(
        model.reactions()[0].propensity,
        Propensity::General { .. }
    ));

    // kcat*S/(Km + S) at S = 4
    let mut state = vec![0.0; model.n_species()];
    state[model.species_index("S").unwrap()] = 4.0;
    assert_close(
        model.reactions()[0]
            .propensity
            .get_propensity(&state, model.param_values(), 0.0),
        0.75,
    );

    let s = model.species_index("S").unwrap();
    let p = model.species_index("P").unwrap();
    assert_eq!(model.update_array()[s][0], -1);
    assert_eq!(model.update_array()[p][0], 1);
}

#[test]
fn sbml_rules_translate_and_unsupported_kinds_skip() {
    let document = sbml::load_sbml_str(
        r#"<sbml xmlns="http://www.sbml.org/sbml/level2/version4" level="2" version="4">
             <model id="rules">
               <listOfSpecies>
                 <species id="A" initialAmount="1"/>
               </listOfSpecies>
               <listOfParameters>
                 <parameter id="scale" value="2"/>
               </listOfParameters>
               <listOfRules>
                 <assignmentRule variable="scale">
                   <math xmlns="http://www.w3.org/1998/Math/MathML">
                     <apply><times/><cn>2</cn><ci>A</ci></apply>
                   </math>
                 </assignmentRule>
                 <rateRule variable="A">
                   <math xmlns="http://www.w3.org/1998/Math/MathML"><cn>1</cn></math>
                 </rateRule>
               </listOfRules>
             </model>
           </sbml>"#,
    )
    .unwrap();
    assert_eq!(document.rules.len(), 1);
    assert_eq!(document.rules[0].rule_type, "assignment");
    assert_eq!(document.rules[0].equation, "_scale = (2 * A)");
}

#[test]
fn sbml_cn_e_notation_and_local_parameters() {
    let model = Model::from_sbml_str(
        r#"<sbml xmlns="http://www.sbml.org/sbml/level2/version4" level="2" version="4">
             <model id="births">
               <listOfSpecies>
                 <species id="P" initialAmount="0"/>
               </listOfSpecies>
               <listOfReactions>
                 <reaction id="birth">
                   <listOfProducts>
                     <speciesReference species="P"/>
                   </listOfProducts>
                   <kineticLaw>
                     <math xmlns="http://www.w3.org/1998/Math/MathML">
                       <apply>
                         <times/>
                         <ci>kb</ci>
                         <cn type="e-notation">1<sep/>-3</cn>
                       </apply>
                     </math>
                     <listOfParameters>
                       <parameter id="kb" value="2000"/>
                     </listOfParameters>
                   </kineticLaw>
                 </reaction>
               </listOfReactions>
             </model>
           </sbml>"#,
    )
    .unwrap();
    // the local parameter merged into the flat namespace
    assert_close(model.param_value("kb").unwrap(), 2000.0);
    assert_close(
        model.reactions()[0].propensity.get_propensity(
            &vec![0.0; model.n_species()],
            model.param_values(),
            0.0,
        ),
        2.0,
    );
}

#[test]
fn lineage_truncation_drops_cells_born_outside_the_window() {
    let mut lineage = Lineage::new();
    let root = lineage.push(Schnitz::new(
        vec![0.0, 10.0, 20.0],
        vec![vec![1.0], vec![2.0], vec![3.0]],
        vec![1.0, 1.3, 1.9],
    ));
    lineage.push_daughter(
        root,
        Schnitz::new(vec![20.0, 30.0], vec![vec![1.5], vec![2.5]], vec![1.0, 1.4]),
    );
    lineage.push_daughter(
        root,
        Schnitz::new(vec![20.0, 30.0], vec![vec![1.4], vec![2.6]], vec![1.0, 1.5]),
    );

    let truncated = lineage.truncate(15.0, 25.0);
    assert_eq!(truncated.len(), 2);
    for schnitz in truncated.schnitzes() {
        assert_eq!(schnitz.times, vec![20.0]);
        assert_eq!(schnitz.parent, None);
        assert_eq!(schnitz.daughter1, None);
        assert_eq!(schnitz.daughter2, None);
        assert_eq!(schnitz.data.len(), 1);
        assert_eq!(schnitz.volumes.len(), 1);
    }
}

#[test]
fn lineage_truncation_preserves_surviving_links() {
    let mut lineage = Lineage::new();
    let root = lineage.push(Schnitz::new(
        vec![0.0, 10.0],
        vec![vec![1.0], vec![2.0]],
        vec![1.0, 2.0],
    ));
    let d1 = lineage.push_daughter(
        root,
        Schnitz::new(vec![10.0, 40.0], vec![vec![1.0], vec![2.0]], vec![1.0, 2.0]),
    );
    let d2 = lineage.push_daughter(
        root,
        Schnitz::new(vec![10.0, 15.0], vec![vec![1.0], vec![2.0]], vec![1.0, 1.5]),
    );

    let truncated = lineage.truncate(0.0, 20.0);
    assert_eq!(truncated.len(), 3);
    let new_root = truncated.get(0).unwrap();
    assert_eq!(new_root.daughter1, Some(d1));
    assert_eq!(new_root.daughter2, Some(d2));
    // the long daughter's trace is clipped to the window
    assert_eq!(truncated.get(d1).unwrap().times, vec![10.0]);
    assert_eq!(truncated.get(d1).unwrap().parent, Some(0));

    // every pointer targets a retained schnitz
    for schnitz in truncated.schnitzes() {
        for link in [schnitz.parent, schnitz.daughter1, schnitz.daughter2] {
            if let Some(idx) = link {
                assert!(idx < truncated.len());
            }
        }
    }
}
