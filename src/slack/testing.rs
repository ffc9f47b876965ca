use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ApiMethod, PagingOptions, SlackApiClient, SlackTransport};
use crate::db::MemoryFileStore;
use crate::utils::{AppError, AppResult, DateUtil, parse_utc_offset};

pub type RecordedRequest = (ApiMethod, Vec<(String, String)>);

/// Transport that answers from a queue and records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<Value>,
    downloads: HashMap<String, Vec<u8>>,
    requests: Vec<RecordedRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Value) {
        self.inner.lock().responses.push_back(response);
    }

    pub fn push_download(&self, url: &str, data: Vec<u8>) {
        self.inner.lock().downloads.insert(url.to_string(), data);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().requests.clone()
    }
}

#[async_trait]
impl SlackTransport for ScriptedTransport {
    async fn get(&self, method: ApiMethod, params: &[(&str, String)]) -> AppResult<Value> {
        let mut script = self.inner.lock();
        script.requests.push((
            method,
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        script
            .responses
            .pop_front()
            .ok_or_else(|| AppError::remote(method.as_str(), "no scripted response"))
    }

    async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        self.inner
            .lock()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::remote("file download", format!("{url} returned status 404")))
    }
}

/// 2022-11-05 01:02:03 at +09:00.
pub fn frozen_dates() -> DateUtil {
    let offset = parse_utc_offset("+09:00").unwrap();
    let now = DateUtil::new(offset).at(2022, 11, 5, 1, 2, 3).unwrap();
    DateUtil::frozen(offset, now)
}

pub fn fast_paging() -> PagingOptions {
    PagingOptions {
        request_delay: Duration::ZERO,
        ..PagingOptions::default()
    }
}

pub fn client_with(transport: &ScriptedTransport, paging: PagingOptions) -> SlackApiClient {
    SlackApiClient::new(
        Arc::new(transport.clone()),
        Arc::new(MemoryFileStore::new()),
        frozen_dates(),
        paging,
    )
}
