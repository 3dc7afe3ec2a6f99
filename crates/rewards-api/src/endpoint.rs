//! Catalog of remote API endpoints

use reqwest::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Me,
    Tasks,
    CompleteTask,
    Checkin,
    Ping,
    DailyEarnings,
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Me | Endpoint::Tasks | Endpoint::DailyEarnings => Method::GET,
            Endpoint::Login | Endpoint::CompleteTask | Endpoint::Checkin | Endpoint::Ping => {
                Method::POST
            }
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Login => "/auth/login",
            Endpoint::Me => "/user/me",
            Endpoint::Tasks => "/tasks",
            Endpoint::CompleteTask => "/user/task",
            Endpoint::Checkin => "/user/checkin",
            Endpoint::Ping => "/user/nodes/ping",
            Endpoint::DailyEarnings => "/daily-earnings",
        }
    }

    /// Short name for logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::Login => "login",
            Endpoint::Me => "me",
            Endpoint::Tasks => "tasks",
            Endpoint::CompleteTask => "complete_task",
            Endpoint::Checkin => "checkin",
            Endpoint::Ping => "ping",
            Endpoint::DailyEarnings => "daily_earnings",
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}
