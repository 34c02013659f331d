//! Commands, queries and streams against the gateway.

use crate::{LedgerConfig, LedgerError, LedgerResult};
use futures_util::future::try_join_all;
use ledger_codec::{
    ArchiveEvent, Choice, CreateEvent, Event, Query, Template, TemplateRegistry, Value,
    ARCHIVE_CHOICE,
};
use ledger_stream::{KeyView, KeysView, LedgerStream, QueryView};
use ledger_transport::{HttpClient, WsClient, WsConfig};
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::collections::HashSet;
use tracing::{debug, info};

/// Live view of the contracts matching a query.
pub type QueryStream = LedgerStream<Vec<CreateEvent>>;
/// Live view of the contract with a key.
pub type KeyStream = LedgerStream<Option<CreateEvent>>;
/// Live view of the contracts with a list of keys, by position.
pub type KeysStream = LedgerStream<Vec<Option<CreateEvent>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseResponse {
    exercise_result: Json,
    #[serde(default)]
    events: Vec<Json>,
}

/// Connection to a ledger gateway on behalf of one token.
///
/// Every operation is a single request; nothing is retried.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub(crate) http: HttpClient,
    ws: WsClient,
    templates: TemplateRegistry,
    stream_buffer: usize,
}

impl Ledger {
    pub fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        let token = config.token()?;
        let http = HttpClient::new(config.http_url()?.as_str(), token, config.request_timeout())?;
        let ws = WsClient::new(
            config.ws_url()?,
            token,
            WsConfig {
                heartbeat_interval: config.heartbeat_interval(),
                buffer: config.stream_buffer,
            },
        );
        info!(http = %http.base_url(), ws = %ws.base_url(), "Ledger client created");
        Ok(Self {
            http,
            ws,
            templates: TemplateRegistry::new(),
            stream_buffer: config.stream_buffer,
        })
    }

    /// Register templates whose events may appear in exercise results.
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    fn registry_for(&self, template: &Template) -> TemplateRegistry {
        self.templates.clone().with(template.clone())
    }

    fn decode_events(&self, template: &Template, events: &[Json]) -> LedgerResult<Vec<Event>> {
        let registry = self.registry_for(template);
        events
            .iter()
            .enumerate()
            .map(|(i, e)| {
                Event::from_wire(e, &registry).map_err(|err| LedgerError::from(err.at_index(i)))
            })
            .collect()
    }

    fn decode_exercise(&self, choice: &Choice, response: Json) -> LedgerResult<(Value, Vec<Event>)> {
        let response: ExerciseResponse = serde_json::from_value(response)?;
        let result = choice.decode_result(&response.exercise_result)?;
        let events = self.decode_events(choice.template(), &response.events)?;
        Ok((result, events))
    }

    /// Create a contract.
    pub async fn create(&self, template: &Template, payload: &Value) -> LedgerResult<CreateEvent> {
        let body = json!({
            "templateId": template.id().to_string(),
            "payload": template.encode_payload(payload)?,
        });
        debug!(template = %template.id(), "create");
        let result = self.http.post_json("v1/create", &body).await?;
        Ok(CreateEvent::from_wire(&result, template)?)
    }

    /// Exercise `choice` on a contract. Events are in ledger order.
    pub async fn exercise(
        &self,
        choice: &Choice,
        contract_id: &str,
        argument: &Value,
    ) -> LedgerResult<(Value, Vec<Event>)> {
        let body = json!({
            "templateId": choice.template().id().to_string(),
            "contractId": contract_id,
            "choice": choice.name(),
            "argument": choice.encode_argument(argument)?,
        });
        debug!(choice = choice.name(), contract_id, "exercise");
        let response = self.http.post_json("v1/exercise", &body).await?;
        self.decode_exercise(choice, response)
    }

    /// Exercise `choice` on the contract with `key`.
    pub async fn exercise_by_key(
        &self,
        choice: &Choice,
        key: &Value,
        argument: &Value,
    ) -> LedgerResult<(Value, Vec<Event>)> {
        let template = choice.template();
        let body = json!({
            "templateId": template.id().to_string(),
            "key": template.encode_key(key)?,
            "choice": choice.name(),
            "argument": choice.encode_argument(argument)?,
        });
        debug!(choice = choice.name(), template = %template.id(), "exercise by key");
        let response = self.http.post_json("v1/exercise", &body).await?;
        self.decode_exercise(choice, response)
    }

    /// Create a contract and exercise `choice` on it in one transaction.
    pub async fn create_and_exercise(
        &self,
        choice: &Choice,
        payload: &Value,
        argument: &Value,
    ) -> LedgerResult<(Value, Vec<Event>)> {
        let template = choice.template();
        let body = json!({
            "templateId": template.id().to_string(),
            "payload": template.encode_payload(payload)?,
            "choice": choice.name(),
            "argument": choice.encode_argument(argument)?,
        });
        debug!(choice = choice.name(), template = %template.id(), "create and exercise");
        let response = self.http.post_json("v1/create-and-exercise", &body).await?;
        self.decode_exercise(choice, response)
    }

    fn archive_choice(template: &Template) -> LedgerResult<Choice> {
        template.choice(ARCHIVE_CHOICE).ok_or_else(|| {
            LedgerError::InvalidRequest(format!("template {} cannot be archived", template.id()))
        })
    }

    fn archived_from(contract_hint: Option<&str>, events: Vec<Event>) -> LedgerResult<ArchiveEvent> {
        events
            .into_iter()
            .filter_map(|event| match event {
                Event::Archived(archived) => Some(archived),
                Event::Created(_) => None,
            })
            .find(|archived| contract_hint.map_or(true, |cid| archived.contract_id == cid))
            .ok_or_else(|| {
                LedgerError::UnexpectedResponse("archive produced no archived event".to_string())
            })
    }

    /// Archive a contract.
    pub async fn archive(&self, template: &Template, contract_id: &str) -> LedgerResult<ArchiveEvent> {
        let choice = Self::archive_choice(template)?;
        let (_, events) = self.exercise(&choice, contract_id, &Value::Unit).await?;
        Self::archived_from(Some(contract_id), events)
    }

    /// Archive the contract with `key`.
    pub async fn archive_by_key(&self, template: &Template, key: &Value) -> LedgerResult<ArchiveEvent> {
        let choice = Self::archive_choice(template)?;
        let (_, events) = self.exercise_by_key(&choice, key, &Value::Unit).await?;
        Self::archived_from(None, events)
    }

    fn decode_optional(template: &Template, result: Json) -> LedgerResult<Option<CreateEvent>> {
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(CreateEvent::from_wire(&result, template)?))
    }

    /// Look up an active contract; `None` when it is not active or not visible.
    pub async fn fetch(&self, template: &Template, contract_id: &str) -> LedgerResult<Option<CreateEvent>> {
        let body = json!({
            "templateId": template.id().to_string(),
            "contractId": contract_id,
        });
        let result = self.http.post_json("v1/fetch", &body).await?;
        Self::decode_optional(template, result)
    }

    /// Look up the active contract with `key`.
    pub async fn fetch_by_key(&self, template: &Template, key: &Value) -> LedgerResult<Option<CreateEvent>> {
        let body = json!({
            "templateId": template.id().to_string(),
            "key": template.encode_key(key)?,
        });
        let result = self.http.post_json("v1/fetch", &body).await?;
        Self::decode_optional(template, result)
    }

    /// Active contracts of `template`, optionally filtered by a predicate.
    pub async fn query(&self, template: &Template, query: Option<&Query>) -> LedgerResult<Vec<CreateEvent>> {
        let mut body = json!({ "templateIds": [template.id().to_string()] });
        if let Some(query) = query {
            body["query"] = query.to_json();
        }
        debug!(template = %template.id(), "query");
        let result = self.http.post_json("v1/query", &body).await?;
        let contracts = result.as_array().ok_or_else(|| {
            LedgerError::UnexpectedResponse("query result is not an array".to_string())
        })?;
        contracts
            .iter()
            .map(|c| CreateEvent::from_wire(c, template).map_err(LedgerError::from))
            .collect()
    }

    /// Active contracts matching any of `queries`, without duplicates.
    ///
    /// An empty list matches every contract.
    pub async fn query_many(&self, template: &Template, queries: &[Query]) -> LedgerResult<Vec<CreateEvent>> {
        if queries.is_empty() {
            return self.query(template, None).await;
        }
        let results = try_join_all(queries.iter().map(|q| self.query(template, Some(q)))).await?;
        let mut seen = HashSet::new();
        Ok(results
            .into_iter()
            .flatten()
            .filter(|c| seen.insert(c.contract_id.clone()))
            .collect())
    }

    /// Stream the contracts of `template` matching `query`.
    pub async fn stream_query(&self, template: &Template, query: Option<Query>) -> LedgerResult<QueryStream> {
        self.stream_queries(template, query.into_iter().collect()).await
    }

    /// Stream the contracts of `template` matching any of `queries`.
    pub async fn stream_queries(&self, template: &Template, queries: Vec<Query>) -> LedgerResult<QueryStream> {
        let template_ids = [template.id().to_string()];
        let request = if queries.is_empty() {
            json!([{ "templateIds": template_ids }])
        } else {
            Json::Array(
                queries
                    .iter()
                    .map(|q| json!({ "templateIds": template_ids, "query": q.to_json() }))
                    .collect(),
            )
        };
        info!(template = %template.id(), predicates = queries.len(), "Opening query stream");
        let stream = LedgerStream::open(
            &self.ws,
            "v1/stream/query",
            &request,
            TemplateRegistry::from(template.clone()),
            QueryView::new(queries),
            self.stream_buffer,
        )
        .await?;
        Ok(stream)
    }

    fn fetch_request(template: &Template, keys: &[Value]) -> LedgerResult<Json> {
        let template_id = template.id().to_string();
        let requests = keys
            .iter()
            .map(|key| -> LedgerResult<Json> {
                Ok(json!({ "templateId": template_id, "key": template.encode_key(key)? }))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(Json::Array(requests))
    }

    /// Stream the active contract with `key`.
    pub async fn stream_fetch_by_key(&self, template: &Template, key: Value) -> LedgerResult<KeyStream> {
        let request = Self::fetch_request(template, std::slice::from_ref(&key))?;
        info!(template = %template.id(), "Opening key stream");
        let stream = LedgerStream::open(
            &self.ws,
            "v1/stream/fetch",
            &request,
            TemplateRegistry::from(template.clone()),
            KeyView::new(key),
            self.stream_buffer,
        )
        .await?;
        Ok(stream)
    }

    /// Stream the active contracts with `keys`, by position.
    pub async fn stream_fetch_by_keys(&self, template: &Template, keys: Vec<Value>) -> LedgerResult<KeysStream> {
        if keys.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "stream_fetch_by_keys needs at least one key".to_string(),
            ));
        }
        let request = Self::fetch_request(template, &keys)?;
        info!(template = %template.id(), keys = keys.len(), "Opening keys stream");
        let stream = LedgerStream::open(
            &self.ws,
            "v1/stream/fetch",
            &request,
            TemplateRegistry::from(template.clone()),
            KeysView::new(keys),
            self.stream_buffer,
        )
        .await?;
        Ok(stream)
    }
}
