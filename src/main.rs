use ringserve::{Config, ConfigBuilder, ResourceSet, Server, listener, signal};
use tracing::info;

const INDEX_BODY: &str = "<!DOCTYPE html>\n<html>\n<head><title>ringserve</title></head>\n<body><h1>ringserve</h1><p>served from an io_uring completion loop</p></body>\n</html>\n";

fn parse_args() -> Result<Config, ringserve::Error> {
    let mut builder = ConfigBuilder::new();
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<u16>() {
            Ok(port) => builder = builder.port(port),
            Err(_) => {
                eprintln!("usage: ringserve [port]");
                std::process::exit(2);
            }
        }
    }
    builder.build()
}

fn main() -> Result<(), ringserve::Error> {
    tracing_subscriber::fmt::init();

    let config = parse_args()?;

    let mut resources = ResourceSet::new();
    resources.insert("/", "text/html", INDEX_BODY);
    resources.insert("/index.html", "text/html", INDEX_BODY);

    let (listen_fd, addr) = listener::bind_listener(config.port, config.backlog)?;
    let server = Server::new(&config, listen_fd, resources)?;
    signal::install(&server.shutdown_handle())?;

    info!(%addr, queue_depth = config.queue_depth, "listening");
    let result = server.run();

    // The listener is owned here, not by the core.
    unsafe {
        libc::close(listen_fd);
    }
    result
}
