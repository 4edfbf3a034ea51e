//! pccoe-connect: Web server binary for the PCCOE Connect college social
//! network. Serves the embedded SPA, the REST API and the WebSocket change
//! feed, persisting state in SQLite.

#[tokio::main]
async fn main() {
    pccoe_connect::server::run().await;
}
