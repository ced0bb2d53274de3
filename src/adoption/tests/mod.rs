mod common;
mod tracking;
