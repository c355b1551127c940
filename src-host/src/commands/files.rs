use async_trait::async_trait;
use parley_channel::{CallContext, HandlerFault, RequestHandler};
use serde::Serialize;

use super::fault;
use crate::collaborators::FileFilter;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SelectedFile {
    pub path: Option<String>,
}

pub struct SelectFile(pub AppState);

#[async_trait]
impl RequestHandler for SelectFile {
    type Arg = FileFilter;
    type Output = SelectedFile;
    const RESULT_VERB: &'static str = "selectedFile";

    async fn handle(&self, _ctx: &CallContext, filter: FileFilter) -> Result<SelectedFile, HandlerFault> {
        let chosen = self.0.files().choose(&filter).await.map_err(fault)?;
        Ok(SelectedFile {
            path: chosen.map(|p| p.to_string_lossy().into_owned()),
        })
    }
}
