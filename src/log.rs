use {
	crate::global::*,
	std::{
		fs::{self, File},
		io::{BufWriter, Write},
		path::Path,
		sync::Once,
	},
	tracing::error,
	tracing_appender::rolling,
	tracing_subscriber::{
		EnvFilter, Layer, fmt::time::SystemTime, layer::SubscriberExt, util::SubscriberInitExt,
	},
};

static INIT_LOG: Once = Once::new();

/// When the program panics, the backtrace is outputted to `logs/crash.log`.
pub fn init_panic_handler() {
	std::panic::set_hook(Box::new(move |panic_info| {
		const WRITE_ERR: &str = "Could not write to crash log";
		error!("{}", panic_info);
		eprintln!("{}", panic_info);

		fs::create_dir_all(LOG_DIR).expect("Could not create log dir");
		let file = File::create(Path::new(LOG_DIR).join(CRASH_LOG))
			.expect("Could not create crash log file");
		let backtrace = std::backtrace::Backtrace::force_capture();
		let mut writer = BufWriter::new(file);

		writeln!(writer, "Time: {}", chrono::Local::now()).expect(WRITE_ERR);
		writeln!(writer, "{panic_info}").expect(WRITE_ERR);
		writeln!(writer, "stack backtrace:\n{backtrace}").expect(WRITE_ERR);
		writer.flush().expect(WRITE_ERR);
	}));
}

/// Creates a tracing registry with a file layer writing to `logs/latest.log`.
///
/// See `.env` variable `RUST_LOG` for the layer filter. These variables should be
/// loaded into the environment for the filter to work. See [dotenvy].
pub fn init_logger() {
	INIT_LOG.call_once(|| {
		_ = fs::remove_file(Path::new(LOG_DIR).join(LATEST_LOG));
		let (log_writer, log_guard) =
			tracing_appender::non_blocking(rolling::never(LOG_DIR, LATEST_LOG));
		let latest_log_layer = tracing_subscriber::fmt::layer()
			.with_timer(SystemTime)
			.with_ansi(false)
			.log_internal_errors(true)
			.with_target(true)
			.with_level(true)
			.with_thread_ids(true)
			.pretty()
			.with_writer(log_writer)
			.with_filter(EnvFilter::from_default_env());
		tracing_subscriber::registry().with(latest_log_layer).init();

		// log_guard has to have a static lifetime.
		// We can just let the OS clean it up for us when the process is killed.
		Box::leak(Box::new(log_guard));
	})
}

/// Breadcrumb for pipeline stage transitions. Shows up in `logs/latest.log`
/// under the `pipeline` target so a whole request can be traced end to end.
#[macro_export]
macro_rules! stage_trace {
	(stage: $stage:expr, status: $status:expr) => {
		tracing::info!(target: "pipeline", stage = $stage, status = $status, "stage");
	};
	(stage: $stage:expr, status: $status:expr, details: $details:expr) => {
		tracing::info!(target: "pipeline", stage = $stage, status = $status, details = %$details, "stage");
	};
}
