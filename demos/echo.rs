use tokio::net::TcpListener;
use trellis_web::{Context, Method, Router, Server, StatusCode};

#[tokio::main]
async fn main() {
    let mut router = Router::new();

    router.get("/echo/:word", |ctx: &mut Context| {
        let method = ctx.request.method().map(Method::as_str).unwrap_or("");
        let result = format!(
            r#"{{"method": {:?}, "path": {:?}, "word": {:?}}}"#,
            method,
            ctx.request.uri().path(),
            ctx.param("word").unwrap_or(""),
        );

        ctx.response
            .status(StatusCode::Ok)
            .header("content-type", "application/json")
            .body(result);
    });

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .router(router)
        .build()
        .launch()
        .await;
}
