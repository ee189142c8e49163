use super::types::{LowResMask, MaskTensor, ModelError, PromptPoint, LOW_RES_MASK_SIZE, PADDING_LABEL};
use image::GrayImage;
use ndarray::{Array1, Array2, Array3, Array4};

/// Converts prompts into decoder input tensors and decoder outputs back into masks
pub struct Preprocessor;

impl Preprocessor {
    /// Build `point_coords` `[1, N+1, 2]` and `point_labels` `[1, N+1]`.
    ///
    /// A padding point at the origin labelled -1 is appended because no box
    /// prompt is ever sent.
    pub fn prompt_tensors(points: &[PromptPoint]) -> Result<(Array3<f32>, Array2<f32>), ModelError> {
        if points.is_empty() {
            return Err(ModelError::NoClicks);
        }

        let n = points.len() + 1;
        let mut coords = Array3::<f32>::zeros((1, n, 2));
        let mut labels = Array2::<f32>::zeros((1, n));

        for (i, point) in points.iter().enumerate() {
            coords[[0, i, 0]] = point.x;
            coords[[0, i, 1]] = point.y;
            labels[[0, i]] = point.label;
        }
        labels[[0, n - 1]] = PADDING_LABEL;

        Ok((coords, labels))
    }

    /// Build `mask_input` `[1, 1, 256, 256]` and `has_mask_input` `[1]`
    pub fn mask_input(previous: Option<&LowResMask>) -> (Array4<f32>, Array1<f32>) {
        match previous {
            Some(mask) => (mask.as_array().clone(), Array1::from_vec(vec![1.0])),
            None => (LowResMask::zeros().as_array().clone(), Array1::from_vec(vec![0.0])),
        }
    }

    /// `orig_im_size` as `(height, width)`
    pub fn output_size(width: u32, height: u32) -> Array1<f32> {
        Array1::from_vec(vec![height as f32, width as f32])
    }

    /// Take channel 0 of an `[N, C, H, W]` (or `[H, W]`) output as the full mask
    pub fn full_mask_from_output(shape: &[usize], data: &[f32]) -> Result<MaskTensor, ModelError> {
        let (height, width) = match shape {
            [_, _, h, w] | [_, h, w] | [h, w] => (*h, *w),
            _ => {
                return Err(ModelError::Shape {
                    name: "masks".to_string(),
                    actual: shape.to_vec(),
                })
            }
        };

        let plane = width * height;
        if data.len() < plane || plane == 0 {
            return Err(ModelError::Shape {
                name: "masks".to_string(),
                actual: shape.to_vec(),
            });
        }

        MaskTensor::new(width, height, data[..plane].to_vec())
    }

    /// Take channel 0 of a `[1, C, 256, 256]` output as the continuity mask
    pub fn low_res_from_output(shape: &[usize], data: &[f32]) -> Result<LowResMask, ModelError> {
        let plane = LOW_RES_MASK_SIZE * LOW_RES_MASK_SIZE;
        let valid = matches!(shape, [1, c, h, w] if *c >= 1 && *h == LOW_RES_MASK_SIZE && *w == LOW_RES_MASK_SIZE);
        if !valid || data.len() < plane {
            return Err(ModelError::Shape {
                name: "low_res_masks".to_string(),
                actual: shape.to_vec(),
            });
        }

        let array = Array4::from_shape_vec((1, 1, LOW_RES_MASK_SIZE, LOW_RES_MASK_SIZE), data[..plane].to_vec())?;
        LowResMask::new(array)
    }

    /// Visualise mask logits as a grayscale silhouette (foreground white)
    pub fn mask_to_gray(mask: &MaskTensor, threshold: f32) -> GrayImage {
        GrayImage::from_fn(mask.width as u32, mask.height as u32, |x, y| {
            let value = if mask.get(x as usize, y as usize) > threshold {
                255
            } else {
                0
            };
            image::Luma([value])
        })
    }
}
