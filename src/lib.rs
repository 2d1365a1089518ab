pub mod analyse;
pub mod data;
pub mod detect;
pub mod error;
pub mod ifcurve;
pub mod lems;
pub mod neuroml;
pub mod quantity;
pub mod report;
pub mod sim;
pub mod sweep;
