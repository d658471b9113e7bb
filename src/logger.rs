use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Once,
    },
};

static INIT: Once = Once::new();
static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn is_active() -> bool {
    IS_INITIALIZED.load(Ordering::SeqCst)
}

fn level_filter(verbose: bool) -> log::LevelFilter {
    if verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Debug
    }
}

/// Route log records to `file` when given, otherwise to stderr.
pub fn start(id: &str, file: Option<&Path>, verbose: bool) -> anyhow::Result<()> {
    if is_active() {
        anyhow::bail!("attempted to setup logger more than once");
    }

    let id = format!("{}:{}", id.to_owned(), std::process::id());

    let dispatch = fern::Dispatch::new()
        .format(move |out, msg, record| {
            let time = humantime::format_rfc3339_seconds(std::time::SystemTime::now());
            out.finish(format_args!(
                "[ {id} ] : [ {time} ] : [ {} ] : {msg}",
                record.level()
            ))
        })
        .level(level_filter(verbose));

    match file {
        Some(file) => dispatch.chain(fern::log_file(file)?),
        None => dispatch.chain(std::io::stderr()),
    }
    .apply()?;

    log::trace!("started");

    INIT.call_once(|| IS_INITIALIZED.store(true, Ordering::SeqCst));
    Ok(())
}
