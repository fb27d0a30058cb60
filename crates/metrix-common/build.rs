//! Generates the `metrix.Metrics` gRPC client and server stubs.
//!
//! Messages are declared by hand with `prost` derives in `src/proto.rs`, so the
//! manual builder is used and no `protoc` binary is required at build time.

fn main() {
    let save_metric = tonic_build::manual::Method::builder()
        .name("save_metric")
        .route_name("SaveMetric")
        .input_type("crate::proto::MetricPayload")
        .output_type("crate::proto::SaveMetricResponse")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let service = tonic_build::manual::Service::builder()
        .name("Metrics")
        .package("metrix")
        .method(save_metric)
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
