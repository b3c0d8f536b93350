pub mod branch;
pub mod datasets;
pub mod project;
pub mod run;
pub mod show;
