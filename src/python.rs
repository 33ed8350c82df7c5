//! Python bindings, enabled with the `python` cargo feature.
//!
//! Thin wrappers only: all semantics live in the core modules, and dense
//! vectors cross the boundary as freshly allocated numpy arrays.

use std::collections::HashMap;

use numpy::{IxDyn, PyArrayDyn, PyArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::error::ModelError;
use crate::lineage::{Lineage, Schnitz};
use crate::model::Model;

impl From<ModelError> for PyErr {
    fn from(err: ModelError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

fn export_f64(py: Python<'_>, dims: &[usize], data: &[f64]) -> PyResult<Py<PyAny>> {
    let array = unsafe { PyArrayDyn::<f64>::new(py, IxDyn(dims), false) };
    unsafe {
        array
            .as_slice_mut()
            .map_err(|_| PyValueError::new_err("failed to export data"))?
            .copy_from_slice(data);
    }
    Ok(array.into_any().unbind())
}

fn export_i32(py: Python<'_>, dims: &[usize], data: &[i32]) -> PyResult<Py<PyAny>> {
    let array = unsafe { PyArrayDyn::<i32>::new(py, IxDyn(dims), false) };
    unsafe {
        array
            .as_slice_mut()
            .map_err(|_| PyValueError::new_err("failed to export data"))?
            .copy_from_slice(data);
    }
    Ok(array.into_any().unbind())
}

fn flatten_matrix(matrix: Vec<Vec<i32>>) -> (Vec<usize>, Vec<i32>) {
    let rows = matrix.len();
    let cols = matrix.first().map(Vec::len).unwrap_or(0);
    let flat = matrix.into_iter().flatten().collect();
    (vec![rows, cols], flat)
}

#[pyclass(name = "Model")]
pub struct PyModel {
    inner: Model,
}

#[pymethods]
impl PyModel {
    #[staticmethod]
    fn from_xml(path: &str) -> PyResult<Self> {
        Ok(Self {
            inner: Model::from_xml_file(path)?,
        })
    }

    #[staticmethod]
    fn from_xml_string(text: &str) -> PyResult<Self> {
        Ok(Self {
            inner: Model::from_xml_str(text)?,
        })
    }

    #[staticmethod]
    fn from_sbml(path: &str) -> PyResult<Self> {
        Ok(Self {
            inner: Model::from_sbml_file(path)?,
        })
    }

    fn get_species_list(&self) -> Vec<String> {
        self.inner.species_list().to_vec()
    }

    fn get_param_list(&self) -> Vec<String> {
        self.inner.param_list().to_vec()
    }

    fn get_species_values(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        export_f64(py, &[self.inner.n_species()], self.inner.species_values())
    }

    fn get_params_values(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        export_f64(py, &[self.inner.n_params()], self.inner.param_values())
    }

    fn get_update_array(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let (dims, flat) = flatten_matrix(self.inner.update_array());
        export_i32(py, &dims, &flat)
    }

    fn get_delay_update_array(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let (dims, flat) = flatten_matrix(self.inner.delay_update_array());
        export_i32(py, &dims, &flat)
    }

    fn set_species(&mut self, values: HashMap<String, f64>) -> PyResult<()> {
        self.inner.set_species(&values)?;
        Ok(())
    }

    fn set_params(&mut self, values: HashMap<String, f64>) -> PyResult<()> {
        self.inner.set_params(&values)?;
        Ok(())
    }

    fn get_species_value(&self, name: &str) -> PyResult<f64> {
        Ok(self.inner.species_value(name)?)
    }

    fn get_param_value(&self, name: &str) -> PyResult<f64> {
        Ok(self.inner.param_value(name)?)
    }

    /// Dense index of a species, or -1 when absent.
    fn get_species_index(&self, name: &str) -> isize {
        self.inner
            .species_index(name)
            .map(|idx| idx as isize)
            .unwrap_or(-1)
    }

    /// Dense index of a parameter, or -1 when absent.
    fn get_param_index(&self, name: &str) -> isize {
        self.inner
            .param_index(name)
            .map(|idx| idx as isize)
            .unwrap_or(-1)
    }

    fn get_number_of_species(&self) -> usize {
        self.inner.n_species()
    }

    fn get_number_of_params(&self) -> usize {
        self.inner.n_params()
    }

    fn get_number_of_reactions(&self) -> usize {
        self.inner.n_reactions()
    }

    /// Check that a rate string parses against this model's names.
    fn validate_rate(&self, rate: &str) -> PyResult<()> {
        self.inner.parse_general_expression(rate)?;
        Ok(())
    }
}

#[pyclass(name = "Schnitz")]
#[derive(Clone)]
pub struct PySchnitz {
    inner: Schnitz,
}

#[pymethods]
impl PySchnitz {
    fn get_times(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        export_f64(py, &[self.inner.times.len()], &self.inner.times)
    }

    fn get_volumes(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        export_f64(py, &[self.inner.volumes.len()], &self.inner.volumes)
    }

    fn get_data(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let rows = self.inner.data.len();
        let cols = self.inner.data.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f64> = self.inner.data.iter().flatten().copied().collect();
        export_f64(py, &[rows, cols], &flat)
    }

    fn get_parent(&self) -> isize {
        self.inner.parent.map(|p| p as isize).unwrap_or(-1)
    }

    fn get_daughters(&self) -> (isize, isize) {
        (
            self.inner.daughter1.map(|d| d as isize).unwrap_or(-1),
            self.inner.daughter2.map(|d| d as isize).unwrap_or(-1),
        )
    }
}

#[pyclass(name = "Lineage")]
#[derive(Default)]
pub struct PyLineage {
    inner: Lineage,
}

#[pymethods]
impl PyLineage {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn add_schnitz(
        &mut self,
        times: Vec<f64>,
        data: Vec<Vec<f64>>,
        volumes: Vec<f64>,
    ) -> usize {
        self.inner.push(Schnitz::new(times, data, volumes))
    }

    fn add_daughter(
        &mut self,
        parent: usize,
        times: Vec<f64>,
        data: Vec<Vec<f64>>,
        volumes: Vec<f64>,
    ) -> PyResult<usize> {
        if parent >= self.inner.len() {
            return Err(PyValueError::new_err(format!(
                "parent index {} out of range",
                parent
            )));
        }
        Ok(self
            .inner
            .push_daughter(parent, Schnitz::new(times, data, volumes)))
    }

    fn get_schnitz(&self, idx: usize) -> PyResult<PySchnitz> {
        self.inner
            .get(idx)
            .map(|s| PySchnitz { inner: s.clone() })
            .ok_or_else(|| PyValueError::new_err(format!("schnitz index {} out of range", idx)))
    }

    /// Restrict the lineage to `[t_min, t_max]`; see the core docs for
    /// the survival rule.
    fn truncate(&self, t_min: f64, t_max: f64) -> PyLineage {
        PyLineage {
            inner: self.inner.truncate(t_min, t_max),
        }
    }
}

#[pymodule]
fn bioreactors(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyModel>()?;
    module.add_class::<PyLineage>()?;
    module.add_class::<PySchnitz>()?;
    Ok(())
}
