//! Protobuf types and gRPC clients for the ingot bulk-import toolchain.
//!
//! This crate provides:
//! - Generated protobuf types and gRPC service traits ([`proto`])
//! - Conversions from domain types to wire types ([`convert`])
//!
//! # Architecture
//!
//! The generated code is vendored under `src/generated/` so that building the
//! workspace never requires `protoc`; the definitions live in
//! `proto/ingot/v1/ingot.proto` with the regeneration command in its header.

#![deny(unsafe_code)]
// gRPC clients return tonic::Status - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

/// Generated protobuf types and service traits.
pub mod proto {
    #![allow(clippy::all)]
    #![allow(missing_docs)]

    include!("generated/ingot.v1.rs");
    include!("generated/ingot.v1.tonic.rs");
}

/// Conversions from domain types to wire types.
pub mod convert;
