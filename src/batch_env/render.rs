//! Composition of per-environment frames into one image.
use crate::envs::Frame;
use ndarray::{s, Array3};

/// Tile frames into a single near-square grid image.
///
/// Frames may differ in size; each cell is the maximum frame height and
/// width, with smaller frames placed at the cell's top-left corner over a
/// black background. Lane order is row-major.
pub fn tile_frames(frames: &[Frame]) -> Frame {
    if frames.is_empty() {
        return Array3::zeros((0, 0, 3));
    }
    let cols = (frames.len() as f64).sqrt().ceil() as usize;
    let rows = (frames.len() + cols - 1) / cols;
    let cell_height = frames.iter().map(|f| f.shape()[0]).max().unwrap_or(0);
    let cell_width = frames.iter().map(|f| f.shape()[1]).max().unwrap_or(0);

    let mut tiled = Array3::zeros((rows * cell_height, cols * cell_width, 3));
    for (index, frame) in frames.iter().enumerate() {
        let top = (index / cols) * cell_height;
        let left = (index % cols) * cell_width;
        let (height, width) = (frame.shape()[0], frame.shape()[1]);
        tiled
            .slice_mut(s![top..top + height, left..left + width, ..])
            .assign(frame);
    }
    tiled
}
