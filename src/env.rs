use std::str::FromStr;

lazy_static! {
    pub static ref ENV_FLEET_SPEED: i32 = get_env("ENV_FLEET_SPEED", 60);
    pub static ref ENV_FLEET_CRUISE_SPEED: i32 = get_env("ENV_FLEET_CRUISE_SPEED", 10);
    pub static ref ENV_FLEET_FPS: u32 = get_env("ENV_FLEET_FPS", 120);
    pub static ref ENV_FLEET_MAX_RETRIES: u32 = get_env("ENV_FLEET_MAX_RETRIES", 3);
    pub static ref ENV_FLEET_RETRY_DELAY_MS: u64 = get_env("ENV_FLEET_RETRY_DELAY_MS", 2000);
    pub static ref ENV_FLEET_SETTLE_MS: u64 = get_env("ENV_FLEET_SETTLE_MS", 500);
    pub static ref ENV_FLEET_PANE_WIDTH: u32 = get_env("ENV_FLEET_PANE_WIDTH", 960);
    pub static ref ENV_FLEET_PANE_HEIGHT: u32 = get_env("ENV_FLEET_PANE_HEIGHT", 720);
}

pub fn get_env_str(name: &str, value: String) -> String {
    return std::env::var(name).unwrap_or(value);
}

pub fn get_env<T: FromStr>(name: &str, value: T) -> T {
    let r = std::env::var(name);
    if r.is_err() {
        return value;
    }
    let r = r.unwrap().parse::<T>();
    if let Ok(res) = r {
        res
    } else {
        value
    }
}
