//! Server-side query programs.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use genesisdb_core::{ClientError, ClientResult};

use crate::client::GenesisClient;
use crate::ndjson::split_lines;
use crate::status::{Operation, error_from_response, transport_error};
use crate::wire::QueryRequest;

pub(crate) fn parse_rows(body: &[u8]) -> ClientResult<Vec<JsonValue>> {
    split_lines(body)?
        .iter()
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| ClientError::protocol(format!("invalid query row: {e}")))
        })
        .collect()
}

impl GenesisClient {
    /// Run a query program and return its rows in server order.
    ///
    /// The program text is opaque to the client. Rejections come back as
    /// [`ClientError::QuerySyntax`] (program did not parse) or
    /// [`ClientError::QueryExecution`] (program failed while running).
    pub async fn query(&self, program: &str) -> ClientResult<Vec<JsonValue>> {
        if program.trim().is_empty() {
            return Err(ClientError::validation("query program must not be empty"));
        }
        info!(query_len = program.len(), "running query");

        let response = self
            .post_ndjson("q")
            .json(&QueryRequest { query: program })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Query).await);
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let rows = parse_rows(&body)?;
        debug!(rows = rows.len(), "query finished");
        Ok(rows)
    }

    /// Same as [`query`](Self::query), decoding each row into `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, program: &str) -> ClientResult<Vec<T>> {
        self.query(program)
            .await?
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                serde_json::from_value(row)
                    .map_err(|e| ClientError::protocol(format!("query row {idx}: {e}")))
            })
            .collect()
    }

    /// Alias of [`query`](Self::query).
    pub async fn query_events(&self, program: &str) -> ClientResult<Vec<JsonValue>> {
        self.query(program).await
    }
}
