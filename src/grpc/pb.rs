//! Protobuf messages and clients generated from `proto/` by `build.rs`

pub mod gateway {
    tonic::include_proto!("gateway");
}

pub mod lospan {
    tonic::include_proto!("lospan");
}
