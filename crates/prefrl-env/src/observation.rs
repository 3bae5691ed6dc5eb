use serde::{Deserialize, Serialize};

use crate::EnvError;

/// Dense `f32` tensor produced by an environment.
///
/// Data is stored in row-major order and the last axis is the channel axis
/// (`[height, width, channels]` for pixel observations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Observation {
    /// Creates an observation, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, EnvError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(EnvError::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    pub(crate) fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the last axis (1 for scalar observations).
    #[must_use]
    pub fn channels(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Concatenates frames along the channel axis.
    ///
    /// All frames must share the same shape. The result has the same shape
    /// except for the last axis, which is the sum of the frames' channels.
    pub fn concat_channels<'a, I>(frames: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let frames = frames.into_iter().collect::<Vec<_>>();
        let Some(first) = frames.first() else {
            return Err(EnvError::ShapeMismatch {
                expected: vec![],
                actual: vec![0],
            });
        };
        if let Some(bad) = frames.iter().find(|f| f.shape != first.shape) {
            return Err(EnvError::ShapeMismatch {
                expected: first.shape.clone(),
                actual: bad.shape.clone(),
            });
        }

        let channels = first.channels();
        let positions = first.len() / channels.max(1);
        let mut data = Vec::with_capacity(first.len() * frames.len());
        for pos in 0..positions {
            let range = pos * channels..(pos + 1) * channels;
            for frame in &frames {
                data.extend_from_slice(&frame.data[range.clone()]);
            }
        }

        let mut shape = first.shape.clone();
        match shape.last_mut() {
            Some(last) => *last *= frames.len(),
            None => shape.push(frames.len()),
        }
        Ok(Self { shape, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Observation::new(vec![2, 2], vec![0.0; 3]).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn test_concat_channels_interleaves_per_position() {
        let a = Observation::new(vec![2, 1], vec![1.0, 2.0]).unwrap();
        let b = Observation::new(vec![2, 1], vec![10.0, 20.0]).unwrap();
        let stacked = Observation::concat_channels([&a, &b]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(stacked.data(), &[1.0, 10.0, 2.0, 20.0]);
    }

    #[test]
    fn test_concat_channels_multi_channel_frames() {
        let a = Observation::new(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Observation::new(vec![1, 2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let stacked = Observation::concat_channels([&a, &b]).unwrap();
        assert_eq!(stacked.shape(), &[1, 2, 4]);
        assert_eq!(
            stacked.data(),
            &[1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_concat_channels_shape_mismatch() {
        let a = Observation::zeros(vec![2, 1]);
        let b = Observation::zeros(vec![3, 1]);
        assert!(Observation::concat_channels([&a, &b]).is_err());
    }
}
