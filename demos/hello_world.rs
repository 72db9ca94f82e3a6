use tokio::net::TcpListener;
use trellis_web::{Context, Router, Server, StatusCode};

#[tokio::main]
async fn main() {
    let mut router = Router::new();

    router.get("/", |ctx: &mut Context| {
        ctx.response
            .status(StatusCode::Ok)
            .header("content-type", "text/plain")
            .body("Hello, world!");
    });

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .router(router)
        .build()
        .launch()
        .await;
}
