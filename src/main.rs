use std::{sync::Arc, thread};

use anyhow::Context;

use postern::{
    internal,
    relay::{MailSender, MxLookup, MxResolver, Relay, SmtpSender},
    smtp::Server,
    Config,
};

fn main() -> anyhow::Result<()> {
    postern::logging::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "postern.conf".to_string());
    let config = Arc::new(Config::load(&config_path).context("loading configuration")?);
    config.ensure_dirs().context("creating mail directories")?;

    let relay_config = Arc::clone(&config);
    thread::Builder::new()
        .name("relay".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    internal!(level = ERROR, "unable to start relay runtime: {err}");
                    return;
                }
            };

            let resolver: Arc<dyn MxResolver> = Arc::new(MxLookup::default());
            let sender: Arc<dyn MailSender> = Arc::new(SmtpSender::default());

            if let Err(err) =
                runtime.block_on(Relay::new(relay_config, resolver, sender).serve())
            {
                internal!(level = ERROR, "relay service failed: {err}");
            }
        })
        .context("spawning relay thread")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting acceptor runtime")?;
    runtime.block_on(Server::new(config).serve())
}
