pub const DOMAIN: &str = "netatmo";

/// Publisher name for home topology/status updates
pub const HOME: &str = "home";

pub const CONF_URL_SECURITY: &str = "https://home.netatmo.com/security";

pub const NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL: &str = "netatmo-create-siren-alarm-control-panel";
pub const NETATMO_CREATE_SIREN_SENSOR: &str = "netatmo-create-siren-sensor";
pub const NETATMO_CREATE_OPENING_SENSOR: &str = "netatmo-create-opening-sensor";

pub const EVENT_TYPE_HOME_ALARM: &str = "home_alarm";
pub const EVENT_TYPE_DOOR_TAG_BIG_MOVE: &str = "tag_big_move";
pub const EVENT_TYPE_DOOR_TAG_OPEN: &str = "tag_open";
pub const EVENT_TYPE_DOOR_TAG_SMALL_MOVE: &str = "tag_small_move";

/// Signal name every entity of `home_id` listens on for updates
pub fn home_signal(home_id: &str) -> String {
    format!("{}-{}", HOME, home_id)
}

/// Signal name webhook events of `event_type` are dispatched on
pub fn webhook_signal(event_type: &str) -> String {
    format!("signal-{}-webhook-{}", DOMAIN, event_type)
}
