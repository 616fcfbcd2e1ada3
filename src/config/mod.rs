use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
    pub reminder: ReminderConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки координатора бронирования
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    // Сколько ждать блокировку слота, прежде чем вернуть busy
    pub lock_wait_ms: u64,
    // Сколько раз повторить попытку при транзиентном конфликте
    pub max_retries: u32,
}

// Настройки отбора броней для напоминаний
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub window_hours: i64,
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "excursion_system=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            reservation: ReservationConfig {
                lock_wait_ms: env::var("RESERVATION_LOCK_WAIT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .expect("RESERVATION_LOCK_WAIT_MS must be a valid number"),
                max_retries: env::var("RESERVATION_MAX_RETRIES")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .expect("RESERVATION_MAX_RETRIES must be a valid number"),
            },
            reminder: ReminderConfig {
                enabled: env::var("REMINDER_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("REMINDER_ENABLED must be true or false"),
                window_hours: env::var("REMINDER_WINDOW_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .expect("REMINDER_WINDOW_HOURS must be a valid number"),
                poll_interval_secs: env::var("REMINDER_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .expect("REMINDER_POLL_INTERVAL_SECS must be a valid number"),
            },
        }
    }
}
