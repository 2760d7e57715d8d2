//! resize_image

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::domain::{HandlerError, TaskId};
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeImage {
    pub url: String,
    /// target widths in px
    pub sizes: Vec<u32>,
}

impl Task for ResizeImage {
    const TYPE: &'static str = "resize_image";
}

pub struct ResizeImageHandler;

#[async_trait]
impl Handler<ResizeImage> for ResizeImageHandler {
    async fn handle(
        &self,
        task: ResizeImage,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        if task.url.trim().is_empty() {
            return Err(HandlerError::missing_field("url"));
        }
        if task.sizes.is_empty() || task.sizes.contains(&0) {
            return Err(HandlerError::non_retryable(
                "sizes must be a non-empty list of positive widths",
            ));
        }
        debug!(%task_id, url = %task.url, sizes = ?task.sizes, "resizing image");

        let resized: Vec<String> = task
            .sizes
            .iter()
            .map(|size| format!("resized_{size}.jpg"))
            .collect();
        Ok(json!({ "original": task.url, "resized": resized }))
    }
}
