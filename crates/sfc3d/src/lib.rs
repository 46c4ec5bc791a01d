//! Key algebra for the two space-filling curves used to index
//! positive-coordinate 3-space: 3D Morton (Z-order) codes over cubic
//! cells, and the Bey-refined tetrahedral curve over 6-type
//! tetrahedra.
//!
//! This crate is deliberately tiny and `no_std`: it has no notion of
//! entities, nodes, or storage, only the pure bijective arithmetic
//! that [`spatial_index`](https://docs.rs/spatial_index) builds on.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod morton;
pub mod tetree;
