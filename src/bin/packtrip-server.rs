//! packtrip-server: the trip planning coordination server.

#[tokio::main]
async fn main() {
    packtrip::server::run().await;
}
