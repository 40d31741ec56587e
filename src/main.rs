#[tokio::main]
async fn main() {
    if let Err(err) = sqlsage::run(std::env::args().skip(1)).await {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
