use crate::gui_bridge::model::ProgressModel;
use log::{error, info};
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::Filter;

pub fn progress_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

/// Read-only HTTP view of the running batch.
pub struct ProgressBridge {
    state: Arc<RwLock<ProgressModel>>,
}

fn routes(
    state: Arc<RwLock<ProgressModel>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    warp::path("progress")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter)
        .map(|state: Arc<RwLock<ProgressModel>>| {
            let snapshot = state.read().map(|m| m.clone()).unwrap_or_default();
            warp::reply::json(&snapshot)
        })
}

impl ProgressBridge {
    pub fn serve(state: Arc<RwLock<ProgressModel>>, address: SocketAddr) -> Self {
        let filter = routes(state.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("progress endpoint disabled: {err}");
                    return;
                }
            };
            info!("progress endpoint on http://{address}/progress");
            runtime.block_on(async move {
                warp::serve(filter).run(address).await;
            });
        });
        Self { state }
    }

    pub fn publish_status(&self, message: &str) {
        let completed = self.state.read().map(|m| m.completed).unwrap_or_default();
        println!("[progress] {} ({} trajectories completed)", message, completed);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> ProgressModel {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_route_serves_model() {
        let state = Arc::new(RwLock::new(ProgressModel::new(12)));
        state.write().unwrap().completed = 5;
        let response = warp::test::request()
            .method("GET")
            .path("/progress")
            .reply(&routes(state))
            .await;
        assert_eq!(response.status(), 200);
        let body: ProgressModel = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.total, 12);
        assert_eq!(body.completed, 5);
    }

    #[tokio::test]
    async fn other_paths_are_rejected() {
        let state = Arc::new(RwLock::new(ProgressModel::default()));
        let response = warp::test::request()
            .method("POST")
            .path("/progress")
            .reply(&routes(state))
            .await;
        assert_eq!(response.status(), 405);
    }

    #[test]
    fn bridge_shares_state() {
        let state = Arc::new(RwLock::new(ProgressModel::new(3)));
        let bridge = ProgressBridge::serve(state.clone(), SocketAddr::from(([127, 0, 0, 1], 0)));
        state.write().unwrap().finished = true;
        assert!(bridge.snapshot().finished);
    }
}
