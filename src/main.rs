use tonbo::{default_logger, Bootstrap, Config};
use tracing::Level;

default_logger!(Level::DEBUG);

#[tokio::main]
async fn main() {
    Bootstrap::new(Config::new()).run().await;
}
