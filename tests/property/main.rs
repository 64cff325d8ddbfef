// tests/property/main.rs

mod classifier;
mod sensor;
