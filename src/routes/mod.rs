pub mod util;
pub mod vtt;
