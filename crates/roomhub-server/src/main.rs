#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    roomhub_server::run().await
}
