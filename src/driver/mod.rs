pub mod capabilities;
pub mod service;
pub mod traits;
pub mod webdriver;

pub use service::ChromedriverService;
pub use traits::{BrowserSession, ElementRef};
pub use webdriver::{DriverError, WebDriverClient};
