mod hash_algo;
mod progress;
mod status;

#[rustfmt::skip]
pub use {
    hash_algo::*,
    progress::*,
    status::*,
};
