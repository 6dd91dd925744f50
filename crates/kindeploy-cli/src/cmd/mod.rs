pub mod deploy;
pub mod generate;
