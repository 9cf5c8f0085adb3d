pub mod atlas;
pub mod color_capture;
pub mod display;
pub mod draws;
pub mod identification;
pub mod merge;
pub mod mesh;
pub mod pipeline;
pub mod readback;
pub mod scatter;
