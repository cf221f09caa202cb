#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geom;

use std::fmt;

use geom::{
    ExhaustiveOptions, GroundMeshResult, MeshBuffers, PipelineDiagnostics, PipelineOptions,
    build_ground_mesh_f32, exhaustive_mesh,
};
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Ground point to mesh conversion for JS callers.
///
/// Holds the options and the diagnostics of the last successful build between
/// calls; every build is otherwise independent.
#[wasm_bindgen]
pub struct GroundMeshEngine {
    initialized: bool,
    options: PipelineOptions,
    exhaustive_options: ExhaustiveOptions,
    last_diagnostics: Option<PipelineDiagnostics>,
}

impl Default for GroundMeshEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl GroundMeshEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> GroundMeshEngine {
        GroundMeshEngine {
            initialized: true,
            options: PipelineOptions::default(),
            exhaustive_options: ExhaustiveOptions::default(),
            last_diagnostics: None,
        }
    }

    #[wasm_bindgen]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replace the pipeline options; missing fields keep their defaults.
    #[wasm_bindgen]
    pub fn set_options(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: PipelineOptions = serde_wasm_bindgen::from_value(options).map_err(to_js_error)?;
        self.options = options;
        debug_log!("ground mesh options updated: {:?}", self.options);
        Ok(())
    }

    /// Replace the options of the exhaustive path.
    #[wasm_bindgen]
    pub fn set_exhaustive_options(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: ExhaustiveOptions = serde_wasm_bindgen::from_value(options).map_err(to_js_error)?;
        self.exhaustive_options = options;
        Ok(())
    }

    /// Build a ground mesh and return `{vertices, indices, normals}`.
    #[wasm_bindgen]
    pub fn build(&mut self, positions: &[f32], count: u32, heights: Option<Vec<f32>>) -> Result<JsValue, JsValue> {
        let buffers = self
            .build_buffers(positions, count as usize, heights.as_deref())
            .map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&buffers).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Diagnostics of the last successful build, or `null`.
    #[wasm_bindgen]
    pub fn last_diagnostics(&self) -> Result<JsValue, JsValue> {
        match &self.last_diagnostics {
            Some(diagnostics) => {
                serde_wasm_bindgen::to_value(diagnostics).map_err(|err| JsError::new(&err.to_string()).into())
            }
            None => Ok(JsValue::NULL),
        }
    }

    /// Exhaustive-triple mesh for small arbitrary point sets.
    #[wasm_bindgen]
    pub fn exhaustive_mesh(&self, positions: &[f32], count: u32) -> Result<JsValue, JsValue> {
        let buffers = self
            .exhaustive_buffers(positions, count as usize)
            .map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&buffers).map_err(|err| JsError::new(&err.to_string()).into())
    }
}

impl GroundMeshEngine {
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn set_pipeline_options(&mut self, options: PipelineOptions) {
        self.options = options;
    }

    #[must_use]
    pub fn diagnostics(&self) -> Option<&PipelineDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    /// Run the pipeline and keep its diagnostics.
    pub fn build_buffers(
        &mut self,
        positions: &[f32],
        count: usize,
        heights: Option<&[f32]>,
    ) -> GroundMeshResult<MeshBuffers> {
        let output = build_ground_mesh_f32(positions, count, heights, &self.options)?;
        debug_log!("ground mesh built: {}", output.diagnostics.summary());
        let buffers = output.mesh.to_buffers();
        self.last_diagnostics = Some(output.diagnostics);
        Ok(buffers)
    }

    pub fn exhaustive_buffers(&self, positions: &[f32], count: usize) -> GroundMeshResult<MeshBuffers> {
        let positions: Vec<f64> = positions.iter().map(|&v| f64::from(v)).collect();
        let mesh = exhaustive_mesh(&positions, count, &self.exhaustive_options)?;
        Ok(mesh.to_buffers())
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
