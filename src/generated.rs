pub mod tosan_auth {
    tonic::include_proto!("tosan_auth");
}
