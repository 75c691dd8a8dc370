// src/storage/tests/mod.rs
