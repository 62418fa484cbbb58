pub mod acm;
pub mod system;
pub mod timer;
pub mod usb_system;

pub use system::init_system;
