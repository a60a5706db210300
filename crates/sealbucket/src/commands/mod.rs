pub mod destroy;
pub mod output;
pub mod preview;
pub mod up;
