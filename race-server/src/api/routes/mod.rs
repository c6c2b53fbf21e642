pub mod ghost;
pub mod race;
pub mod training;
