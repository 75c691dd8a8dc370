// src/algorithms/tests/mod.rs

mod fixed_window_tests;
mod sliding_window_tests;
mod token_bucket_tests;
