// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Domain messages shared by tests

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use typedrpc_schema::{Declare, DeclaredType, EnumType, Field, Message};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRequest {
    pub id: Uuid,
}

impl PingRequest {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for PingRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl Message for PingRequest {
    const NAME: &'static str = "PingRequest";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Uuid>("id")]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl PingResponse {
    /// Response echoing `id`, stamped now.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
        }
    }
}

impl Message for PingResponse {
    const NAME: &'static str = "PingResponse";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<Uuid>("id"),
            Field::of::<DateTime<Utc>>("timestamp"),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Names {
    Alice,
    Bob,
    Carol,
}

impl Declare for Names {
    fn declared_type() -> DeclaredType {
        DeclaredType::Enum(EnumType::new("Names", &["Alice", "Bob", "Carol"]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub zip: u32,
}

impl Message for Address {
    const NAME: &'static str = "Address";

    fn fields() -> Vec<Field> {
        vec![Field::of::<String>("street"), Field::of::<u32>("zip")]
    }
}

/// One field of every supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexModel {
    pub flag: bool,
    pub small: i32,
    pub large: i64,
    pub unsigned: u64,
    pub ratio: f64,
    pub label: String,
    pub raw: Bytes,
    pub id: Uuid,
    pub born: NaiveDate,
    pub seen: DateTime<Utc>,
    pub name: Names,
    pub nickname: Option<String>,
    pub scores: Vec<i32>,
    pub tags: BTreeMap<String, String>,
    pub counters: HashMap<u32, i64>,
    pub address: Address,
    pub previous: Option<Address>,
    pub history: Vec<Address>,
    pub directory: BTreeMap<String, Address>,
}

impl ComplexModel {
    /// A model with every field populated.
    pub fn sample() -> Self {
        Self {
            flag: true,
            small: -7,
            large: 1 << 40,
            unsigned: u64::MAX,
            ratio: 0.25,
            label: "complex".to_string(),
            raw: Bytes::from_static(&[0, 159, 146, 150, 255]),
            id: Uuid::new_v4(),
            born: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap_or_default(),
            seen: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            name: Names::Bob,
            nickname: Some("bobby".to_string()),
            scores: vec![3, 1, 4],
            tags: BTreeMap::from([
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "y".to_string()),
            ]),
            counters: HashMap::from([(1, -1), (2, 2)]),
            address: Address {
                street: "Main St".to_string(),
                zip: 12345,
            },
            previous: None,
            history: vec![Address {
                street: "Old Rd".to_string(),
                zip: 1,
            }],
            directory: BTreeMap::from([(
                "home".to_string(),
                Address {
                    street: "Home Ln".to_string(),
                    zip: 2,
                },
            )]),
        }
    }
}

impl Message for ComplexModel {
    const NAME: &'static str = "ComplexModel";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<bool>("flag"),
            Field::of::<i32>("small"),
            Field::of::<i64>("large"),
            Field::of::<u64>("unsigned"),
            Field::of::<f64>("ratio"),
            Field::of::<String>("label"),
            Field::of::<Bytes>("raw"),
            Field::of::<Uuid>("id"),
            Field::of::<NaiveDate>("born"),
            Field::of::<DateTime<Utc>>("seen"),
            Field::of::<Names>("name"),
            Field::of::<Option<String>>("nickname"),
            Field::of::<Vec<i32>>("scores"),
            Field::of::<BTreeMap<String, String>>("tags"),
            Field::of::<HashMap<u32, i64>>("counters"),
            Field::of::<Address>("address"),
            Field::of::<Option<Address>>("previous"),
            Field::of::<Vec<Address>>("history"),
            Field::of::<BTreeMap<String, Address>>("directory"),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexRequest {
    pub model: ComplexModel,
}

impl Message for ComplexRequest {
    const NAME: &'static str = "ComplexRequest";

    fn fields() -> Vec<Field> {
        vec![Field::of::<ComplexModel>("model")]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexResponse {
    pub model: ComplexModel,
    pub checksum: u64,
}

impl Message for ComplexResponse {
    const NAME: &'static str = "ComplexResponse";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<ComplexModel>("model"),
            Field::of::<u64>("checksum"),
        ]
    }
}

/// Raw payload, for the bytes round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Bytes,
}

impl Message for Blob {
    const NAME: &'static str = "Blob";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Bytes>("data")]
    }
}

/// Self-referential message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub value: i64,
    pub left: Option<Box<Tree>>,
    pub right: Option<Box<Tree>>,
}

impl Tree {
    pub fn leaf(value: i64) -> Self {
        Self {
            value,
            left: None,
            right: None,
        }
    }

    pub fn node(value: i64, left: Tree, right: Tree) -> Self {
        Self {
            value,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn sum(&self) -> i64 {
        self.value
            + self.left.as_ref().map_or(0, |t| t.sum())
            + self.right.as_ref().map_or(0, |t| t.sum())
    }
}

impl Message for Tree {
    const NAME: &'static str = "Tree";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<i64>("value"),
            Field::new("left", DeclaredType::optional(Tree::declared_type())),
            Field::new("right", DeclaredType::optional(Tree::declared_type())),
        ]
    }
}

/// `Ping` and `Pong` refer to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub depth: u32,
    pub pong: Option<Box<Pong>>,
}

impl Message for Ping {
    const NAME: &'static str = "Ping";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<u32>("depth"),
            Field::new("pong", DeclaredType::optional(Pong::declared_type())),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub depth: u32,
    pub ping: Option<Box<Ping>>,
}

impl Message for Pong {
    const NAME: &'static str = "Pong";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<u32>("depth"),
            Field::new("ping", DeclaredType::optional(Ping::declared_type())),
        ]
    }
}

impl Ping {
    /// Chain alternating `Ping` and `Pong` of the given depth.
    pub fn chain(depth: u32) -> Self {
        let pong = (depth > 0).then(|| {
            Box::new(Pong {
                depth: depth - 1,
                ping: (depth > 1).then(|| Box::new(Ping::chain(depth - 2))),
            })
        });
        Ping { depth, pong }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Number {
    pub value: i64,
}

impl Message for Number {
    const NAME: &'static str = "Number";

    fn fields() -> Vec<Field> {
        vec![Field::of::<i64>("value")]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sum {
    pub total: i64,
    pub count: u32,
}

impl Message for Sum {
    const NAME: &'static str = "Sum";

    fn fields() -> Vec<Field> {
        vec![Field::of::<i64>("total"), Field::of::<u32>("count")]
    }
}

/// Message with a field of an unsupported nested container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: Vec<Vec<i32>>,
}

impl Message for Matrix {
    const NAME: &'static str = "Matrix";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Vec<Vec<i32>>>("rows")]
    }
}

/// Message with optional list elements, which have no wire representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sparse {
    pub values: Vec<Option<i32>>,
}

impl Message for Sparse {
    const NAME: &'static str = "Sparse";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Vec<Option<i32>>>("values")]
    }
}
