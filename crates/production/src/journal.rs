//! Production journal: the stream that numbers and records production runs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bakeops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId, ValueObject};
use bakeops_events::Event;
use bakeops_inventory::{InventoryItemId, Unit};
use bakeops_products::ProductId;

use crate::plan::checked_total;

/// Aggregate type tag used for the production journal stream.
pub const AGGREGATE_TYPE: &str = "production.journal";

/// Production journal identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionJournalId(pub AggregateId);

impl ProductionJournalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductionJournalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Production run identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionRunId(pub Uuid);

impl ProductionRunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ProductionRunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one ingredient consumed by a run, frozen at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDeduction {
    pub item_id: InventoryItemId,
    pub item_name: String,
    /// Amount removed from stock, in `unit`.
    pub amount: Decimal,
    /// Always the ingredient's base unit.
    pub unit: Unit,
    pub cost_per_base_unit: Decimal,
    pub line_cost: Decimal,
}

impl ValueObject for IngredientDeduction {}

/// A recorded production run.
///
/// `cost` is historical: later ingredient cost changes never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub id: ProductionRunId,
    /// Sequential run number within the journal, starting at 1.
    pub number: u64,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity_produced: u32,
    pub batches: u32,
    pub date: NaiveDate,
    pub cost: Decimal,
    pub ingredients_deducted: Vec<IngredientDeduction>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate root: ProductionJournal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionJournal {
    id: ProductionJournalId,
    runs: Vec<ProductionRun>,
    version: u64,
}

impl ProductionJournal {
    /// Empty journal for rehydration.
    pub fn empty(id: ProductionJournalId) -> Self {
        Self {
            id,
            runs: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ProductionJournalId {
        self.id
    }

    /// Number the next recorded run will get.
    pub fn next_run_number(&self) -> u64 {
        self.runs.len() as u64 + 1
    }

    pub fn runs(&self) -> &[ProductionRun] {
        &self.runs
    }

    pub fn run(&self, run_id: ProductionRunId) -> Option<&ProductionRun> {
        self.runs.iter().find(|r| r.id == run_id)
    }
}

impl AggregateRoot for ProductionJournal {
    type Id = ProductionJournalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordProductionRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProductionRun {
    pub journal_id: ProductionJournalId,
    pub run_id: ProductionRunId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity_produced: u32,
    pub batches: u32,
    pub date: NaiveDate,
    pub ingredients_deducted: Vec<IngredientDeduction>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    RecordProductionRun(RecordProductionRun),
}

/// Event: ProductionRunRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRunRecorded {
    pub journal_id: ProductionJournalId,
    pub run: ProductionRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    ProductionRunRecorded(ProductionRunRecorded),
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::ProductionRunRecorded(_) => "production.journal.run_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::ProductionRunRecorded(e) => e.run.recorded_at,
        }
    }
}

impl Aggregate for ProductionJournal {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::ProductionRunRecorded(e) => {
                self.id = e.journal_id;
                self.runs.push(e.run.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::RecordProductionRun(cmd) => self.handle_record(cmd),
        }
    }
}

impl ProductionJournal {
    fn handle_record(&self, cmd: &RecordProductionRun) -> Result<Vec<JournalEvent>, DomainError> {
        if cmd.journal_id != self.id {
            return Err(DomainError::invariant("journal_id mismatch"));
        }
        if cmd.quantity_produced == 0 || cmd.batches == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if cmd.ingredients_deducted.is_empty() {
            return Err(DomainError::validation(
                "a production run must consume at least one ingredient",
            ));
        }
        if self.run(cmd.run_id).is_some() {
            return Err(DomainError::conflict(format!(
                "production run {} already recorded",
                cmd.run_id.0
            )));
        }

        let cost = checked_total(cmd.ingredients_deducted.iter().map(|d| d.line_cost))?;

        Ok(vec![JournalEvent::ProductionRunRecorded(ProductionRunRecorded {
            journal_id: cmd.journal_id,
            run: ProductionRun {
                id: cmd.run_id,
                number: self.next_run_number(),
                product_id: cmd.product_id,
                product_name: cmd.product_name.clone(),
                quantity_produced: cmd.quantity_produced,
                batches: cmd.batches,
                date: cmd.date,
                cost,
                ingredients_deducted: cmd.ingredients_deducted.clone(),
                notes: cmd.notes.clone(),
                recorded_by: cmd.recorded_by,
                recorded_at: cmd.occurred_at,
            },
        })])
    }
}
