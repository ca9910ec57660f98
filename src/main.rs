#[tokio::main]
async fn main() {
    if let Err(e) = dialogs_search_lib::run().await {
        eprintln!("dialogs-search: {}", e);
        std::process::exit(1);
    }
}
