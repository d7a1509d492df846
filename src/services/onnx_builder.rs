// Shared ONNX Runtime session builder for the detector and OCR models

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

/// Clamp the configured thread count to something sane for this host.
///
/// Using every core on Windows hurts more than it helps due to
/// synchronization overhead, so cap it there.
fn intra_op_threads(requested: usize) -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = requested.min(6).min(total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = requested.min(total_cores).max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// Load an ONNX model from disk, trying CUDA first when the feature is on.
///
/// A missing file is reported before ONNX Runtime gets a chance to produce
/// a less readable error.
pub fn build_session(model_path: &Path, threads: usize) -> Result<Session> {
    if !model_path.exists() {
        anyhow::bail!("Model file not found: {}", model_path.display());
    }

    let model_bytes = std::fs::read(model_path)
        .with_context(|| format!("Failed to read model {}", model_path.display()))?;
    let threads = intra_op_threads(threads);

    #[cfg(feature = "cuda")]
    {
        let cuda = Session::builder()
            .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_memory(&model_bytes));

        match cuda {
            Ok(session) => {
                info!("✓ {} loaded with CUDA acceleration", model_path.display());
                return Ok(session);
            }
            Err(e) => warn!("CUDA unavailable ({}), falling back to CPU", e),
        }
    }

    let session = Session::builder()?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads)?
        .commit_from_memory(&model_bytes)
        .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

    info!("✓ {} loaded on CPU ({} threads)", model_path.display(), threads);
    Ok(session)
}

/// Name of the model's `index`-th input, for models that don't use fixed names
pub fn input_name(session: &Session, index: usize) -> Result<String> {
    session
        .inputs
        .get(index)
        .map(|input| input.name.clone())
        .with_context(|| format!("Model has no input #{}", index))
}

pub fn output_name(session: &Session, index: usize) -> Result<String> {
    session
        .outputs
        .get(index)
        .map(|output| output.name.clone())
        .with_context(|| format!("Model has no output #{}", index))
}
