pub mod command;
pub mod input;
pub mod template;
pub mod threat;

pub use command::CommandSanitizer;
pub use input::InputValidator;
pub use template::TemplateSanitizer;
pub use threat::ThreatDetector;
