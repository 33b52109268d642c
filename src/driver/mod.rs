pub mod appium;
pub mod common;
pub mod context;
#[cfg(test)]
pub mod mock;
pub mod resolver;
pub mod traits;

pub use appium::AppiumClient;
pub use traits::{AutomationDriver, ElementHandle, Locator, Platform};
