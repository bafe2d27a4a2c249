use std::sync::Arc;
use std::time::Duration;

use pipecast_frame::{CodecConfig, Palette, PaletteConfig};
use pipecast_stream::{FeedConfig, InputConfig, Relay, RelayConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, palette_error, stream_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = relay_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    let result = runtime.block_on(serve(config));
    // A palette wait may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

fn relay_config(args: &ServeArgs) -> CliResult<RelayConfig> {
    let defaults = RelayConfig::default();
    Ok(RelayConfig {
        bind: args.bind,
        stream_path: args.stream_path.clone(),
        input_path: args.input_path.clone(),
        static_dir: args.static_dir.clone(),
        palette_path: args.palette.clone(),
        palette: PaletteConfig {
            wait_timeout: parse_duration(&args.palette_timeout)?,
            ..defaults.palette
        },
        codec: CodecConfig {
            quality: args.quality,
            channel_order: args.channel_order.into(),
        },
        feed: FeedConfig {
            video_pipe: args.video_pipe.clone(),
            poll_timeout: parse_duration(&args.poll_timeout)?,
            ..defaults.feed
        },
        input: InputConfig {
            input_pipe: args.input_pipe.clone(),
            ..defaults.input
        },
        shutdown_grace: defaults.shutdown_grace,
    })
}

async fn serve(config: RelayConfig) -> CliResult<i32> {
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let Some(palette) = wait_for_palette(&config, &shutdown).await? else {
        info!("shutdown requested before the palette appeared");
        return Ok(SUCCESS);
    };

    let relay = Relay::start(config, Arc::new(palette), shutdown)
        .map_err(|err| stream_error("failed to start relay", err))?;
    relay
        .serve()
        .await
        .map_err(|err| stream_error("relay failed", err))?;
    Ok(SUCCESS)
}

/// Block (off the runtime) until the palette loads, or return `None` on shutdown.
async fn wait_for_palette(
    config: &RelayConfig,
    shutdown: &CancellationToken,
) -> CliResult<Option<Palette>> {
    let path = config.palette_path.clone();
    let palette_config = config.palette;
    info!(path = ?path, timeout = ?palette_config.wait_timeout, "waiting for palette");

    let loading = tokio::task::spawn_blocking(move || Palette::wait_for(&path, &palette_config));
    tokio::select! {
        _ = shutdown.cancelled() => Ok(None),
        loaded = loading => {
            let palette = loaded
                .map_err(|err| CliError::new(INTERNAL, format!("palette loader failed: {err}")))?
                .map_err(|err| palette_error("palette unavailable", err))?;
            Ok(Some(palette))
        }
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received; shutting down"),
        _ = terminate => info!("terminate received; shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: Command,
    }

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let mut argv = vec!["pipecast", "serve"];
        argv.extend_from_slice(extra);
        match Harness::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn builds_config_from_flags() {
        let args = serve_args(&[
            "--bind",
            "127.0.0.1:8080",
            "--video-pipe",
            "/tmp/v",
            "--quality",
            "55",
            "--channel-order",
            "bgr",
            "--poll-timeout",
            "50ms",
        ]);
        let config = relay_config(&args).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.feed.video_pipe, std::path::PathBuf::from("/tmp/v"));
        assert_eq!(config.feed.poll_timeout, Duration::from_millis(50));
        assert_eq!(config.codec.quality, 55);
        assert_eq!(config.codec.channel_order, pipecast_frame::ChannelOrder::Bgr);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_durations() {
        let args = serve_args(&["--palette-timeout", "soon"]);
        let err = relay_config(&args).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
