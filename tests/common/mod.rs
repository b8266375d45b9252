use std::collections::HashMap;
use std::net::TcpListener;
use std::thread;

use tiny_http::{Header, Response, Server};

/// What the stub publisher returns for one request path.
#[derive(Clone)]
pub enum Route {
    Redirect(&'static str),
    Html(String),
    Pdf(Vec<u8>),
}

/// Serves `routes` on an ephemeral localhost port until the test process exits.
/// Unknown paths answer 404. Returns the base URL, e.g. `http://127.0.0.1:4711`.
pub fn serve(routes: Vec<(&'static str, Route)>) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let routes: HashMap<&'static str, Route> = routes.into_iter().collect();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let path = request.url().to_string();
            let result = match routes.get(path.as_str()) {
                Some(Route::Redirect(location)) => request.respond(
                    Response::empty(302).with_header(header("Location", location)),
                ),
                Some(Route::Html(body)) => request.respond(
                    Response::from_string(body.clone())
                        .with_header(header("Content-Type", "text/html")),
                ),
                Some(Route::Pdf(bytes)) => request.respond(
                    Response::from_data(bytes.clone())
                        .with_header(header("Content-Type", "application/pdf")),
                ),
                None => request.respond(Response::from_string("not found").with_status_code(404)),
            };
            if result.is_err() {
                break;
            }
        }
    });

    format!("http://{addr}")
}

/// Accepts connections and never answers, for exercising request timeouts.
pub fn serve_silently() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://{addr}")
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

pub fn landing_page(links: &[&str]) -> String {
    let anchors = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">link</a>"#))
        .collect::<String>();
    format!("<html><body><h1>Article</h1>{anchors}</body></html>")
}
