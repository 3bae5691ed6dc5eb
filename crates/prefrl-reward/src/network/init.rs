//! Parameter initialization for reward networks.
//!
//! - [`from_fn`] builds a parameter vector from an index function
//! - [`he_normal`] samples weights for leaky-ReLU layers
//! - [`uniform`] samples small weights for linear layers

use rand::Rng;
use rand_distr::Normal;

/// Creates a parameter vector by applying a function to each index.
///
/// # Examples
///
/// ```
/// use prefrl_reward::network::init;
///
/// let params = init::from_fn(|i| i as f32 * 0.5, 3);
/// assert_eq!(params, vec![0.0, 0.5, 1.0]);
/// ```
pub fn from_fn<F>(mut f: F, len: usize) -> Vec<f32>
where
    F: FnMut(usize) -> f32,
{
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        values.push(f(i));
    }
    values
}

/// Samples `len` weights from `N(0, sqrt(2 / fan_in))`.
///
/// # Panics
///
/// Panics if `fan_in` is zero.
pub fn he_normal<R>(rng: &mut R, fan_in: usize, len: usize) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    assert!(fan_in > 0, "fan_in must be positive");
    #[expect(clippy::cast_precision_loss)]
    let std_dev = (2.0 / fan_in as f32).sqrt();
    let normal = Normal::new(0.0, std_dev).unwrap();
    from_fn(|_| rng.sample(normal), len)
}

/// Samples `len` weights uniformly from `[-scale, scale]`.
pub fn uniform<R>(rng: &mut R, scale: f32, len: usize) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    from_fn(|_| rng.random_range(-scale..=scale), len)
}
