use anyhow::{Context, Result as AnyhowResult};
use candle_core::{DType, Device, Tensor};
use once_cell::sync::Lazy;

// Pooling accumulates in f64, which Metal kernels do not support, so only a
// CUDA device is tried before falling back to CPU.
static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| match Device::cuda_if_available(0) {
    Ok(device) if device.is_cuda() => {
        log::info!("Successfully initialized Candle CUDA device (GPU) for pooling.");
        device
    }
    Ok(device) => {
        log::debug!("No CUDA device compiled in or present; pooling on CPU.");
        device
    }
    Err(err) => {
        log::warn!(
            "Failed to initialize Candle CUDA device: {:?}. Falling back to CPU device.",
            err
        );
        Device::Cpu
    }
});

/// Pools equal-width vectors into `[mean | max | min]`, each taken per
/// component across all input vectors. Output width is `3 * dimension`.
pub fn pool_mean_max_min(vectors: &[Vec<f32>], dimension: usize) -> AnyhowResult<Vec<f64>> {
    if vectors.is_empty() {
        return Err(anyhow::anyhow!("Cannot pool an empty vector list"));
    }
    if dimension == 0 {
        return Err(anyhow::anyhow!("Cannot pool zero-dimension vectors"));
    }
    if let Some((idx, bad)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != dimension)
    {
        return Err(anyhow::anyhow!(
            "Vector {} has {} components, expected {}",
            idx,
            bad.len(),
            dimension
        ));
    }

    let rows = vectors.len();
    let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    let stacked = Tensor::from_vec(flat, (rows, dimension), &CANDLE_DEVICE)
        .with_context(|| format!("Failed to create ({}, {}) tensor for pooling", rows, dimension))?
        .to_dtype(DType::F64)
        .context("Widening pooling tensor to f64 failed")?;

    let mean = stacked.mean(0).context("Column mean for pooling failed")?;
    let max = stacked.max(0).context("Column max for pooling failed")?;
    let min = stacked.min(0).context("Column min for pooling failed")?;
    let pooled = Tensor::cat(&[&mean, &max, &min], 0).context("Concatenating pooled vectors failed")?;

    pooled
        .to_vec1::<f64>() // Brings data back to CPU if pooled on GPU
        .context("Converting pooled tensor to vector failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_scenario() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let pooled = pool_mean_max_min(&vectors, 2).unwrap();
        assert_eq!(pooled, vec![2.0 / 3.0, 1.0 / 3.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pool_single_vector() {
        let pooled = pool_mean_max_min(&[vec![-1.0, 2.5, 0.0]], 3).unwrap();
        assert_eq!(pooled, vec![-1.0, 2.5, 0.0, -1.0, 2.5, 0.0, -1.0, 2.5, 0.0]);
    }

    #[test]
    fn test_pool_mean_keeps_f64_precision() {
        // An f32 mean would round to f32 precision here.
        let pooled = pool_mean_max_min(&[vec![0.1], vec![0.2], vec![0.3]], 1).unwrap();
        let widened = [0.1f32, 0.2, 0.3].map(f64::from);
        let mean = widened.iter().sum::<f64>() / 3.0;
        assert!((pooled[0] - mean).abs() < 1e-15, "got {}, want {}", pooled[0], mean);
    }

    #[test]
    fn test_pool_rejects_bad_input() {
        assert!(pool_mean_max_min(&[], 2).is_err());
        assert!(pool_mean_max_min(&[vec![1.0, 2.0], vec![1.0]], 2).is_err());
    }
}
