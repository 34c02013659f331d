//! In-process stand-in for the JSON gateway.
//!
//! Holds contracts of a handful of templates in memory and serves the HTTP
//! and WebSocket endpoints the client uses. Package ids are fixed to `pkg0`.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_client::{Codec, LedgerConfig, Schema, Template, TemplateId, TemplateRegistry, Value};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as Jv};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const PACKAGE_ID: &str = "pkg0";
pub const ALICE: &str = "Alice";
pub const BOB: &str = "Bob";

// ---------------------------------------------------------------------------
// Client-side descriptors
// ---------------------------------------------------------------------------

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .record(
                "Person",
                [("name", Codec::Text), ("party", Codec::Party), ("age", Codec::Int64)],
            )
            .record("Person.Key", [("_1", Codec::Party), ("_2", Codec::Int64)])
            .record("Rename", [("newName", Codec::Text)])
            .record(
                "Counter",
                [("p", Codec::Party), ("t", Codec::Text), ("c", Codec::Int64)],
            )
            .record("Counter.Key", [("_1", Codec::Party), ("_2", Codec::Text)])
            .record("Change", [("n", Codec::Int64)])
            .build()
            .unwrap(),
    )
}

pub fn person_template() -> Template {
    Template::builder(TemplateId::new("Main", "Person"), schema(), Codec::named("Person"))
        .key(Codec::named("Person.Key"))
        .choice("Birthday", Codec::Unit, Codec::ContractId)
        .choice("Rename", Codec::named("Rename"), Codec::ContractId)
        .build()
}

pub fn counter_template() -> Template {
    Template::builder(TemplateId::new("Main", "Counter"), schema(), Codec::named("Counter"))
        .key(Codec::named("Counter.Key"))
        .choice("Change", Codec::named("Change"), Codec::ContractId)
        .build()
}

fn all_types_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .record(
                "Person",
                [("name", Codec::Text), ("party", Codec::Party), ("age", Codec::Int64)],
            )
            .record("Pair", [("one", Codec::Int64), ("two", Codec::Text)])
            .record("Lib.Mod.Imported", [("something", Codec::Text)])
            .record("Lib.Mod.Wrapper", [("field", Codec::named("Lib.Mod.Imported"))])
            .variant("Either", [("Left", Codec::Int64), ("Right", Codec::Text)])
            .record("Tuple2", [("_1", Codec::Int64), ("_2", Codec::Text)])
            .enumeration("Color", ["Red", "Blue", "Yellow"])
            .variant(
                "Expr",
                [("Lit", Codec::Int64), ("Add", Codec::named("Expr.Add"))],
            )
            .record(
                "Expr.Add",
                [("_1", Codec::named("Expr")), ("_2", Codec::named("Expr"))],
            )
            .variant(
                "Expr2",
                [("Lit2", Codec::Int64), ("Add2", Codec::named("Expr2.Add2"))],
            )
            .record(
                "Expr2.Add2",
                [("lhs", Codec::named("Expr2")), ("rhs", Codec::named("Expr2"))],
            )
            .record(
                "Recursive",
                [
                    ("recOptional", Codec::optional(Codec::named("Recursive"))),
                    ("recList", Codec::list(Codec::named("Recursive"))),
                    ("recTextMap", Codec::text_map(Codec::named("Recursive"))),
                ],
            )
            .record(
                "AllTypes",
                [
                    ("unit", Codec::Unit),
                    ("bool", Codec::Bool),
                    ("int", Codec::Int64),
                    ("text", Codec::Text),
                    ("date", Codec::Date),
                    ("time", Codec::Timestamp),
                    ("party", Codec::Party),
                    ("contractId", Codec::ContractId),
                    ("optional", Codec::optional(Codec::Int64)),
                    ("optional2", Codec::optional(Codec::Int64)),
                    ("optionalOptionalInt", Codec::optional(Codec::optional(Codec::Int64))),
                    ("optionalOptionalInt2", Codec::optional(Codec::optional(Codec::Int64))),
                    ("optionalOptionalInt3", Codec::optional(Codec::optional(Codec::Int64))),
                    ("list", Codec::list(Codec::Bool)),
                    ("textMap", Codec::text_map(Codec::Int64)),
                    ("monoRecord", Codec::named("Person")),
                    ("polyRecord", Codec::named("Pair")),
                    ("imported", Codec::named("Lib.Mod.Wrapper")),
                    ("either", Codec::named("Either")),
                    ("tuple", Codec::named("Tuple2")),
                    ("enum", Codec::named("Color")),
                    ("enumList", Codec::list(Codec::named("Color"))),
                    ("variant", Codec::named("Expr")),
                    ("n0", Codec::Numeric(0)),
                    ("n5", Codec::Numeric(5)),
                    ("n10", Codec::Numeric(10)),
                    ("rec", Codec::named("Recursive")),
                    ("genMap", Codec::gen_map(Codec::named("Expr2"), Codec::Int64)),
                ],
            )
            .record("Lib.Mod.NonTopLevel", [("party", Codec::Party)])
            .build()
            .unwrap(),
    )
}

/// A keyless template whose payload exercises every value shape.
pub fn all_types_template() -> Template {
    Template::builder(
        TemplateId::new("Main", "AllTypes"),
        all_types_schema(),
        Codec::named("AllTypes"),
    )
    .build()
}

/// A template outside the top-level module.
pub fn non_top_level_template() -> Template {
    Template::builder(
        TemplateId::new("Lib.Mod", "NonTopLevel"),
        all_types_schema(),
        Codec::named("Lib.Mod.NonTopLevel"),
    )
    .build()
}

pub fn registry() -> TemplateRegistry {
    TemplateRegistry::new()
        .with(person_template())
        .with(counter_template())
        .with(all_types_template())
        .with(non_top_level_template())
}

pub fn person(name: &str, party: &str, age: i64) -> Value {
    Value::record([
        ("name", Value::text(name)),
        ("party", Value::party(party)),
        ("age", Value::Int64(age)),
    ])
}

pub fn person_key(party: &str, age: i64) -> Value {
    Value::record([("_1", Value::party(party)), ("_2", Value::Int64(age))])
}

pub fn counter(p: &str, t: &str, c: i64) -> Value {
    Value::record([
        ("p", Value::party(p)),
        ("t", Value::text(t)),
        ("c", Value::Int64(c)),
    ])
}

pub fn counter_key(p: &str, t: &str) -> Value {
    Value::record([("_1", Value::party(p)), ("_2", Value::text(t))])
}

/// Wire form of an `AllTypes` payload owned by `party`.
pub fn all_types_wire(party: &str, contract_id: &str) -> Jv {
    let lit2 = |n: &str| json!({"tag": "Lit2", "value": n});
    let add2 = |l: &str, r: &str| json!({"tag": "Add2", "value": {"lhs": lit2(l), "rhs": lit2(r)}});
    json!({
        "unit": {},
        "bool": true,
        "int": "5",
        "text": "Hello",
        "date": "2019-04-04",
        "time": "2019-12-31T12:34:56.789Z",
        "party": party,
        "contractId": contract_id,
        "optional": "5",
        "optional2": null,
        "optionalOptionalInt": ["5"],
        "optionalOptionalInt2": [],
        "optionalOptionalInt3": null,
        "list": [true, false],
        "textMap": {"alice": "2", "bob & carl": "3"},
        "monoRecord": {"name": "Alice from Wonderland", "party": party, "age": "5"},
        "polyRecord": {"one": "10", "two": "XYZ"},
        "imported": {"field": {"something": "pqr"}},
        "either": {"tag": "Right", "value": "really?"},
        "tuple": {"_1": "12", "_2": "mmm"},
        "enum": "Red",
        "enumList": ["Red", "Blue", "Yellow"],
        "variant": {"tag": "Add", "value": {"_1": {"tag": "Lit", "value": "1"}, "_2": {"tag": "Lit", "value": "2"}}},
        "n0": "3.0",
        "n5": "3.14159",
        "n10": "3.1415926536",
        "rec": {"recOptional": null, "recList": [], "recTextMap": {}},
        "genMap": [[add2("1", "2"), "3"], [add2("5", "4"), "9"]]
    })
}

// ---------------------------------------------------------------------------
// Gateway state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Contract {
    contract_id: String,
    entity: String,
    payload: Jv,
    key: Jv,
    signatories: Vec<String>,
}

impl Contract {
    fn template_id(&self) -> String {
        format!("{}:{}", PACKAGE_ID, self.entity)
    }

    fn created(&self) -> Jv {
        json!({
            "contractId": self.contract_id,
            "templateId": self.template_id(),
            "payload": self.payload,
            "key": self.key,
            "signatories": self.signatories,
            "observers": [],
            "agreementText": ""
        })
    }

    fn archived(&self) -> Jv {
        json!({"contractId": self.contract_id, "templateId": self.template_id()})
    }
}

#[derive(Debug, Clone)]
enum TxEvent {
    Created(Contract),
    Archived(Contract),
}

impl TxEvent {
    fn contract(&self) -> &Contract {
        match self {
            TxEvent::Created(c) | TxEvent::Archived(c) => c,
        }
    }

    fn wire(&self) -> Jv {
        match self {
            TxEvent::Created(c) => json!({"created": c.created()}),
            TxEvent::Archived(c) => json!({"archived": c.archived()}),
        }
    }
}

#[derive(Debug, Clone)]
struct Transaction {
    offset: String,
    events: Vec<TxEvent>,
}

struct LedgerState {
    contracts: Vec<Contract>,
    next_id: u64,
    offset: u64,
    parties: Vec<Jv>,
    packages: Vec<(String, Vec<u8>)>,
}

#[derive(Clone)]
struct Gateway {
    ledger: Arc<Mutex<LedgerState>>,
    transactions: broadcast::Sender<Arc<Transaction>>,
}

/// A running fake gateway.
pub struct FakeGateway {
    pub http_base_url: String,
}

impl FakeGateway {
    pub async fn start() -> Self {
        let (transactions, _) = broadcast::channel(256);
        let gateway = Gateway {
            ledger: Arc::new(Mutex::new(LedgerState {
                contracts: Vec::new(),
                next_id: 0,
                offset: 0,
                parties: vec![party_json(ALICE, Some(ALICE)), party_json(BOB, Some(BOB))],
                packages: vec![
                    (PACKAGE_ID.to_string(), b"PK\x03\x04main".to_vec()),
                    ("prim".to_string(), b"PK\x03\x04prim".to_vec()),
                ],
            })),
            transactions,
        };

        let app = Router::new()
            .route("/v1/create", post(create))
            .route("/v1/exercise", post(exercise))
            .route("/v1/create-and-exercise", post(create_and_exercise))
            .route("/v1/fetch", post(fetch))
            .route("/v1/query", post(query))
            .route("/v1/parties", get(list_parties).post(get_parties))
            .route("/v1/parties/allocate", post(allocate_party))
            .route("/v1/packages", get(list_packages).post(upload_package))
            .route("/v1/packages/:id", get(get_package))
            .route("/v1/stream/query", get(stream_query))
            .route("/v1/stream/fetch", get(stream_fetch))
            .with_state(gateway);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            http_base_url: format!("http://{}/", addr),
        }
    }

    pub fn config(&self, token: &str) -> LedgerConfig {
        let mut config = LedgerConfig::for_gateway(self.http_base_url.clone(), token);
        config.heartbeat_interval_secs = None;
        config.request_timeout_secs = 10;
        config
    }
}

fn party_json(identifier: &str, display_name: Option<&str>) -> Jv {
    json!({"identifier": identifier, "displayName": display_name, "isLocal": true})
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok(result: Jv) -> Response {
    Json(json!({"status": 200, "result": result})).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"status": status.as_u16(), "errors": [message.into()]})),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(t) if !t.is_empty() => Ok(()),
        _ => Err(failure(StatusCode::UNAUTHORIZED, "missing bearer token")),
    }
}

const KNOWN_TEMPLATES: [&str; 4] = [
    "Main:Person",
    "Main:Counter",
    "Main:AllTypes",
    "Lib.Mod:NonTopLevel",
];

/// `Main:Person` or `pkg0:Main:Person` to `Main:Person`, for known templates.
fn entity_of(template_id: &Jv) -> Option<String> {
    let text = template_id.as_str()?;
    let parts: Vec<&str> = text.split(':').collect();
    let (package, module, entity) = match parts.as_slice() {
        [module, entity] => (None, *module, *entity),
        [package, module, entity] => (Some(*package), *module, *entity),
        _ => return None,
    };
    let qualified = format!("{}:{}", module, entity);
    let known = KNOWN_TEMPLATES.contains(&qualified.as_str());
    (known && package.map_or(true, |p| p == PACKAGE_ID)).then_some(qualified)
}

/// Contract key; `null` for keyless templates.
fn key_of(entity: &str, payload: &Jv) -> Jv {
    match entity {
        "Main:Person" => json!({"_1": payload["party"], "_2": payload["age"]}),
        "Main:Counter" => json!({"_1": payload["p"], "_2": payload["t"]}),
        _ => Jv::Null,
    }
}

fn int_of(json: &Jv) -> Option<i64> {
    match json {
        Jv::String(s) => s.parse().ok(),
        Jv::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn field_matches(constraint: &Jv, value: &Jv) -> bool {
    if let Jv::Object(ops) = constraint {
        if !ops.is_empty() && ops.keys().all(|k| k.starts_with('%')) {
            let Some(v) = int_of(value) else { return false };
            return ops.iter().all(|(op, bound)| match (op.as_str(), int_of(bound)) {
                ("%lt", Some(b)) => v < b,
                ("%lte", Some(b)) => v <= b,
                ("%gt", Some(b)) => v > b,
                ("%gte", Some(b)) => v >= b,
                _ => false,
            });
        }
    }
    match (int_of(constraint), int_of(value)) {
        (Some(a), Some(b)) if !constraint.is_string() || !value.is_string() => a == b,
        _ => constraint == value,
    }
}

fn query_matches(query: Option<&Jv>, payload: &Jv) -> bool {
    match query.and_then(Jv::as_object) {
        None => true,
        Some(fields) => fields
            .iter()
            .all(|(name, constraint)| payload.get(name).is_some_and(|v| field_matches(constraint, v))),
    }
}

impl LedgerState {
    fn create(&mut self, entity: &str, payload: Jv, actor: Vec<String>) -> Contract {
        self.next_id += 1;
        let contract = Contract {
            contract_id: format!("#{}:0", self.next_id),
            entity: entity.to_string(),
            key: key_of(entity, &payload),
            payload,
            signatories: actor,
        };
        self.contracts.push(contract.clone());
        contract
    }

    fn archive(&mut self, contract_id: &str) -> Option<Contract> {
        let index = self.contracts.iter().position(|c| c.contract_id == contract_id)?;
        Some(self.contracts.remove(index))
    }

    fn find(&self, entity: &str, body: &Map<String, Jv>) -> Option<&Contract> {
        if let Some(cid) = body.get("contractId").and_then(Jv::as_str) {
            return self
                .contracts
                .iter()
                .find(|c| c.contract_id == cid && c.entity == entity);
        }
        let key = body.get("key")?;
        self.contracts
            .iter()
            .find(|c| c.entity == entity && keys_equal(&c.key, key))
    }

    fn commit(&mut self, gateway: &Gateway, events: Vec<TxEvent>) {
        self.offset += 1;
        let _ = gateway.transactions.send(Arc::new(Transaction {
            offset: self.offset.to_string(),
            events,
        }));
    }

    /// Run a choice; returns the result and the events it produced.
    fn run_choice(
        &mut self,
        contract: Contract,
        choice: &str,
        argument: &Jv,
    ) -> Result<(Jv, Vec<TxEvent>), String> {
        let mut payload = contract.payload.clone();
        match (contract.entity.as_str(), choice) {
            (_, "Archive") => {
                self.archive(&contract.contract_id);
                return Ok((json!({}), vec![TxEvent::Archived(contract)]));
            }
            ("Main:Person", "Birthday") => {
                let age = int_of(&payload["age"]).ok_or("bad age")?;
                payload["age"] = Jv::String((age + 1).to_string());
            }
            ("Main:Person", "Rename") => {
                payload["name"] = argument.get("newName").cloned().ok_or("missing newName")?;
            }
            ("Main:Counter", "Change") => {
                payload["c"] = argument.get("n").cloned().ok_or("missing n")?;
            }
            (entity, choice) => return Err(format!("unknown choice {} on {}", choice, entity)),
        }
        self.archive(&contract.contract_id);
        let created = self.create(&contract.entity, payload, contract.signatories.clone());
        Ok((
            Jv::String(created.contract_id.clone()),
            vec![TxEvent::Archived(contract), TxEvent::Created(created)],
        ))
    }
}

/// Keys compare with integers normalized, since clients may send numbers.
fn keys_equal(stored: &Jv, requested: &Jv) -> bool {
    match (stored, requested) {
        (Jv::Object(a), Jv::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| field_matches(w, v)))
        }
        _ => stored == requested,
    }
}

fn actor(payload: &Jv) -> Vec<String> {
    ["party", "p"]
        .iter()
        .find_map(|f| payload.get(*f).and_then(Jv::as_str))
        .map(|p| vec![p.to_string()])
        .unwrap_or_default()
}

fn wire_events(events: &[TxEvent]) -> Jv {
    Jv::Array(events.iter().map(TxEvent::wire).collect())
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn create(State(gw): State<Gateway>, headers: HeaderMap, Json(body): Json<Map<String, Jv>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let Some(entity) = body.get("templateId").and_then(entity_of) else {
        return failure(StatusCode::BAD_REQUEST, "unknown template");
    };
    let Some(payload) = body.get("payload").cloned() else {
        return failure(StatusCode::BAD_REQUEST, "missing payload");
    };
    let mut ledger = gw.ledger.lock();
    let key = key_of(&entity, &payload);
    if !key.is_null()
        && ledger
            .contracts
            .iter()
            .any(|c| c.entity == entity && keys_equal(&c.key, &key))
    {
        return failure(StatusCode::CONFLICT, "duplicate contract key");
    }
    let contract = ledger.create(&entity, payload.clone(), actor(&payload));
    ledger.commit(&gw, vec![TxEvent::Created(contract.clone())]);
    ok(contract.created())
}

async fn exercise(State(gw): State<Gateway>, headers: HeaderMap, Json(body): Json<Map<String, Jv>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let Some(entity) = body.get("templateId").and_then(entity_of) else {
        return failure(StatusCode::BAD_REQUEST, "unknown template");
    };
    let choice = body.get("choice").and_then(Jv::as_str).unwrap_or_default();
    let argument = body.get("argument").cloned().unwrap_or(Jv::Null);
    let mut ledger = gw.ledger.lock();
    let Some(contract) = ledger.find(&entity, &body).cloned() else {
        return failure(StatusCode::NOT_FOUND, "contract not found");
    };
    match ledger.run_choice(contract, choice, &argument) {
        Ok((result, events)) => {
            let wire = wire_events(&events);
            ledger.commit(&gw, events);
            ok(json!({"exerciseResult": result, "events": wire}))
        }
        Err(message) => failure(StatusCode::BAD_REQUEST, message),
    }
}

async fn create_and_exercise(
    State(gw): State<Gateway>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Jv>>,
) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let Some(entity) = body.get("templateId").and_then(entity_of) else {
        return failure(StatusCode::BAD_REQUEST, "unknown template");
    };
    let Some(payload) = body.get("payload").cloned() else {
        return failure(StatusCode::BAD_REQUEST, "missing payload");
    };
    let choice = body.get("choice").and_then(Jv::as_str).unwrap_or_default();
    let argument = body.get("argument").cloned().unwrap_or(Jv::Null);
    let mut ledger = gw.ledger.lock();
    let contract = ledger.create(&entity, payload.clone(), actor(&payload));
    match ledger.run_choice(contract.clone(), choice, &argument) {
        Ok((result, exercised)) => {
            let mut events = vec![TxEvent::Created(contract)];
            events.extend(exercised);
            let wire = wire_events(&events);
            ledger.commit(&gw, events);
            ok(json!({"exerciseResult": result, "events": wire}))
        }
        Err(message) => {
            ledger.archive(&contract.contract_id);
            failure(StatusCode::BAD_REQUEST, message)
        }
    }
}

async fn fetch(State(gw): State<Gateway>, headers: HeaderMap, Json(body): Json<Map<String, Jv>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let Some(entity) = body.get("templateId").and_then(entity_of) else {
        return failure(StatusCode::BAD_REQUEST, "unknown template");
    };
    let ledger = gw.ledger.lock();
    ok(ledger.find(&entity, &body).map_or(Jv::Null, Contract::created))
}

async fn query(State(gw): State<Gateway>, headers: HeaderMap, Json(body): Json<Map<String, Jv>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let entities: Option<Vec<String>> = body
        .get("templateIds")
        .and_then(Jv::as_array)
        .map(|ids| ids.iter().filter_map(entity_of).collect());
    let Some(entities) = entities.filter(|e| !e.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "unknown template");
    };
    let ledger = gw.ledger.lock();
    let result = ledger
        .contracts
        .iter()
        .filter(|c| entities.contains(&c.entity) && query_matches(body.get("query"), &c.payload))
        .map(Contract::created)
        .collect();
    ok(Jv::Array(result))
}

async fn get_parties(State(gw): State<Gateway>, headers: HeaderMap, Json(ids): Json<Vec<String>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let ledger = gw.ledger.lock();
    // Known parties only, in reverse order of the request.
    let found: Vec<Jv> = ids
        .iter()
        .rev()
        .filter_map(|id| ledger.parties.iter().find(|p| p["identifier"] == id.as_str()).cloned())
        .collect();
    ok(Jv::Array(found))
}

async fn list_parties(State(gw): State<Gateway>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    ok(Jv::Array(gw.ledger.lock().parties.clone()))
}

async fn allocate_party(State(gw): State<Gateway>, headers: HeaderMap, Json(body): Json<Map<String, Jv>>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let mut ledger = gw.ledger.lock();
    let identifier = match body.get("identifierHint").and_then(Jv::as_str) {
        Some(hint) => hint.to_string(),
        None => format!("party-{}", ledger.parties.len() + 1),
    };
    if ledger.parties.iter().any(|p| p["identifier"] == identifier.as_str()) {
        return failure(StatusCode::BAD_REQUEST, "party already exists");
    }
    let party = party_json(&identifier, body.get("displayName").and_then(Jv::as_str));
    ledger.parties.push(party.clone());
    ok(party)
}

async fn list_packages(State(gw): State<Gateway>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let ids = gw.ledger.lock().packages.iter().map(|(id, _)| json!(id)).collect();
    ok(Jv::Array(ids))
}

async fn get_package(State(gw): State<Gateway>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    let ledger = gw.ledger.lock();
    match ledger.packages.iter().find(|(pid, _)| *pid == id) {
        Some((_, bytes)) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes.clone(),
        )
            .into_response(),
        None => failure(StatusCode::NOT_FOUND, format!("package {} not found", id)),
    }
}

async fn upload_package(State(gw): State<Gateway>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorized(&headers) {
        return resp;
    }
    if !body.starts_with(b"PK") {
        return failure(StatusCode::BAD_REQUEST, "not a DAR archive");
    }
    let mut ledger = gw.ledger.lock();
    let id = format!("pkg{}", ledger.packages.len());
    ledger.packages.push((id, body.to_vec()));
    ok(json!(1))
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Which events of a transaction a subscription sees.
#[derive(Debug, Clone)]
enum Subscription {
    Query(Vec<(Vec<String>, Option<Jv>)>),
    Fetch(Vec<(String, Jv)>),
}

impl Subscription {
    fn parse(path: &str, text: &str) -> Result<Self, String> {
        let requests: Vec<Map<String, Jv>> =
            serde_json::from_str(text).map_err(|e| format!("malformed request: {}", e))?;
        if path == "query" {
            let mut parsed = Vec::new();
            for request in requests {
                let entities: Vec<String> = request
                    .get("templateIds")
                    .and_then(Jv::as_array)
                    .map(|ids| ids.iter().filter_map(entity_of).collect())
                    .unwrap_or_default();
                if entities.is_empty() {
                    return Err("unknown template".to_string());
                }
                parsed.push((entities, request.get("query").cloned()));
            }
            Ok(Subscription::Query(parsed))
        } else {
            let mut parsed = Vec::new();
            for request in requests {
                let entity = request
                    .get("templateId")
                    .and_then(entity_of)
                    .ok_or("unknown template")?;
                let key = request.get("key").cloned().ok_or("missing key")?;
                parsed.push((entity, key));
            }
            Ok(Subscription::Fetch(parsed))
        }
    }

    fn wants_created(&self, contract: &Contract) -> bool {
        match self {
            Subscription::Query(requests) => requests.iter().any(|(entities, query)| {
                entities.contains(&contract.entity) && query_matches(query.as_ref(), &contract.payload)
            }),
            Subscription::Fetch(requests) => requests
                .iter()
                .any(|(entity, key)| *entity == contract.entity && keys_equal(&contract.key, key)),
        }
    }

    /// Query streams see every archival of their templates.
    fn wants_archived(&self, contract: &Contract) -> bool {
        match self {
            Subscription::Query(requests) => requests
                .iter()
                .any(|(entities, _)| entities.contains(&contract.entity)),
            Subscription::Fetch(_) => self.wants_created(contract),
        }
    }

    fn filter(&self, events: &[TxEvent]) -> Vec<Jv> {
        events
            .iter()
            .filter(|e| match e {
                TxEvent::Created(c) => self.wants_created(c),
                TxEvent::Archived(c) => self.wants_archived(c),
            })
            .map(TxEvent::wire)
            .collect()
    }
}

fn has_token_protocol(headers: &HeaderMap) -> bool {
    headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|p| p.trim().starts_with("jwt.token.")))
}

async fn stream_query(State(gw): State<Gateway>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if !has_token_protocol(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "missing token sub-protocol");
    }
    ws.protocols(["daml.ws.auth"])
        .on_upgrade(move |socket| serve_stream(gw, socket, "query"))
}

async fn stream_fetch(State(gw): State<Gateway>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if !has_token_protocol(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "missing token sub-protocol");
    }
    ws.protocols(["daml.ws.auth"])
        .on_upgrade(move |socket| serve_stream(gw, socket, "fetch"))
}

async fn send_json(socket: &mut WebSocket, frame: Jv) -> bool {
    socket.send(Message::Text(frame.to_string())).await.is_ok()
}

async fn serve_stream(gw: Gateway, mut socket: WebSocket, path: &'static str) {
    let request = match socket.recv().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return,
    };
    let subscription = match Subscription::parse(path, &request) {
        Ok(s) => s,
        Err(message) => {
            send_json(&mut socket, json!({"errors": [message], "status": 400})).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (snapshot, offset, mut transactions) = {
        let ledger = gw.ledger.lock();
        let receiver = gw.transactions.subscribe();
        let snapshot: Vec<Jv> = ledger
            .contracts
            .iter()
            .filter(|c| subscription.wants_created(c))
            .map(|c| json!({"created": c.created()}))
            .collect();
        (snapshot, ledger.offset.to_string(), receiver)
    };

    if !snapshot.is_empty() && !send_json(&mut socket, json!({"events": snapshot})).await {
        return;
    }
    if !send_json(&mut socket, json!({"events": [], "offset": offset})).await {
        return;
    }

    loop {
        tokio::select! {
            tx = transactions.recv() => match tx {
                Ok(tx) => {
                    let events = subscription.filter(&tx.events);
                    if !events.is_empty()
                        && !send_json(&mut socket, json!({"events": events, "offset": tx.offset})).await
                    {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    send_json(&mut socket, json!({"errors": ["subscriber lagged"], "status": 500})).await;
                    return;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
