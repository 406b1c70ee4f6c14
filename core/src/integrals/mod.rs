pub mod ao2mo;
mod electron_tensor;

pub use electron_tensor::{ElectronTensor, IntegralIndex};
