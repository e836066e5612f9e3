use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, если `RUST_LOG` не задан
pub const DEFAULT_FILTER: &str = "warn,dialogue_tts=info";

pub fn init_logger() {
    init_logger_with(DEFAULT_FILTER);
}

/// Инициализация с другим фильтром по умолчанию (например, для `--verbose`)
pub fn init_logger_with(default_filter: &str) {
    // Установка базового фильтра и переопределение через переменные окружения
    let env = Env::default().filter_or("RUST_LOG", default_filter);

    let mut builder = Builder::from_env(env);

    // Явно подавляем логи от шумных модулей
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("symphonia_core", LevelFilter::Warn)
        .filter_module("symphonia_format_ogg", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    // Повторная инициализация (например, в тестах) не считается ошибкой
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
