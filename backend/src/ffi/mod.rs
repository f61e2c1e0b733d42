//! PyO3 wrapper for the Orchestrator
//!
//! Python sees one class, `Simulation`, built from a JSON configuration
//! string. Reports cross the boundary as JSON strings.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::orchestrator::{Orchestrator, SimulationConfig, SimulationError};

fn runtime_error(context: &str, error: SimulationError) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(format!("{}: {}", context, error))
}

/// Python wrapper for the Rust Orchestrator
///
/// # Example (from Python)
///
/// ```python
/// from location_simulator_core_rs import Simulation
///
/// sim = Simulation('{"couples": 2, "run_length": 10000.0}')
/// result = sim.step()
/// print(f"{result['time']} ms: {result['num_events']} events")
/// report = json.loads(sim.run())
/// ```
#[pyclass(name = "Simulation")]
pub struct PySimulation {
    inner: Orchestrator,
}

#[pymethods]
impl PySimulation {
    /// Create a simulation from a JSON configuration
    ///
    /// Missing fields take their defaults. Raises ValueError if the JSON
    /// does not parse or the configuration is invalid.
    #[new]
    fn new(config_json: &str) -> PyResult<Self> {
        let config: SimulationConfig = serde_json::from_str(config_json)
            .map_err(|e| PyErr::new::<PyValueError, _>(format!("Invalid config JSON: {}", e)))?;

        let inner = Orchestrator::new(config).map_err(|e| match e {
            SimulationError::InvalidConfig(_) => PyErr::new::<PyValueError, _>(e.to_string()),
            other => runtime_error("Failed to create simulation", other),
        })?;

        Ok(PySimulation { inner })
    }

    /// Process one batch of simultaneous events
    ///
    /// Returns a dictionary with `time`, `num_events`, `num_stale` and
    /// `finished`.
    fn step<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let result = self
            .inner
            .step()
            .map_err(|e| runtime_error("Step failed", e))?;

        let dict = PyDict::new_bound(py);
        dict.set_item("time", result.time.as_millis())?;
        dict.set_item("num_events", result.num_events)?;
        dict.set_item("num_stale", result.num_stale)?;
        dict.set_item("finished", result.finished)?;
        Ok(dict)
    }

    /// Run to the end and return the report as JSON
    fn run(&mut self) -> PyResult<String> {
        let report = self
            .inner
            .run()
            .map_err(|e| runtime_error("Run failed", e))?;
        report
            .to_json()
            .map_err(|e| runtime_error("Report serialization failed", e))
    }

    /// Report of the statistics collected so far, as JSON
    fn report(&self) -> PyResult<String> {
        self.inner
            .report()
            .to_json()
            .map_err(|e| runtime_error("Report serialization failed", e))
    }

    /// Current virtual time in milliseconds
    fn now(&self) -> f64 {
        self.inner.now().as_millis()
    }

    fn config_hash(&self) -> String {
        self.inner.config_hash().to_string()
    }
}
