pub mod batch;

pub use batch::BatchAccumulator;
