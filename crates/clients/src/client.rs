use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use washline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId};
use washline_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// One row of a client's transaction ledger.
///
/// `balance` is this entry's own effect (`amount - deposit`), `running_balance`
/// the client's balance right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub txn_no: u32,
    pub amount: u64,
    pub deposit: u64,
    pub balance: i64,
    pub running_balance: i64,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    shop_id: Option<ShopId>,
    name: String,
    contact: ContactInfo,
    status: ClientStatus,
    balance: i64,
    ledger: Vec<LedgerEntry>,
    version: u64,
    created: bool,
}

impl Client {
    /// Not-yet-registered instance used for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            shop_id: None,
            name: String::new(),
            contact: ContactInfo::default(),
            status: ClientStatus::Active,
            balance: 0,
            ledger: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// What the client owes the shop; negative means the shop holds credit.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClientDetails {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Charge `amount` to the client while taking `deposit` up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub amount: u64,
    pub deposit: u64,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateClient {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateClient {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClientDetails(UpdateClientDetails),
    RecordTransaction(RecordTransaction),
    DeactivateClient(DeactivateClient),
    ReactivateClient(ReactivateClient),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetailsUpdated {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub txn_no: u32,
    pub amount: u64,
    pub deposit: u64,
    pub balance: i64,
    pub running_balance: i64,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDeactivated {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReactivated {
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientDetailsUpdated(ClientDetailsUpdated),
    TransactionRecorded(TransactionRecorded),
    ClientDeactivated(ClientDeactivated),
    ClientReactivated(ClientReactivated),
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientDetailsUpdated(_) => "clients.client.details_updated",
            ClientEvent::TransactionRecorded(_) => "clients.client.transaction_recorded",
            ClientEvent::ClientDeactivated(_) => "clients.client.deactivated",
            ClientEvent::ClientReactivated(_) => "clients.client.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientDetailsUpdated(e) => e.occurred_at,
            ClientEvent::TransactionRecorded(e) => e.occurred_at,
            ClientEvent::ClientDeactivated(e) => e.occurred_at,
            ClientEvent::ClientReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.shop_id = Some(e.shop_id);
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = ClientStatus::Active;
                self.balance = 0;
                self.ledger.clear();
                self.created = true;
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(contact) = &e.contact {
                    self.contact = contact.clone();
                }
            }
            ClientEvent::TransactionRecorded(e) => {
                self.balance = e.running_balance;
                self.ledger.push(LedgerEntry {
                    txn_no: e.txn_no,
                    amount: e.amount,
                    deposit: e.deposit,
                    balance: e.balance,
                    running_balance: e.running_balance,
                    memo: e.memo.clone(),
                    occurred_at: e.occurred_at,
                });
            }
            ClientEvent::ClientDeactivated(_) => {
                self.status = ClientStatus::Inactive;
            }
            ClientEvent::ClientReactivated(_) => {
                self.status = ClientStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClientDetails(cmd) => self.handle_update(cmd),
            ClientCommand::RecordTransaction(cmd) => self.handle_record_transaction(cmd),
            ClientCommand::DeactivateClient(cmd) => self.handle_deactivate(cmd),
            ClientCommand::ReactivateClient(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Client {
    fn ensure_exists(&self, shop_id: ShopId, client_id: ClientId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            shop_id: cmd.shop_id,
            client_id: cmd.client_id,
            name: name.to_string(),
            contact: cmd.contact.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClientDetails) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.client_id)?;

        if cmd.name.is_none() && cmd.contact.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }
        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => Some(n.trim().to_string()),
            None => None,
        };

        Ok(vec![ClientEvent::ClientDetailsUpdated(ClientDetailsUpdated {
            shop_id: cmd.shop_id,
            client_id: cmd.client_id,
            name,
            contact: cmd.contact.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_transaction(
        &self,
        cmd: &RecordTransaction,
    ) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.client_id)?;

        if self.status == ClientStatus::Inactive {
            return Err(DomainError::invariant("inactive client cannot transact"));
        }
        if cmd.amount == 0 && cmd.deposit == 0 {
            return Err(DomainError::validation(
                "transaction needs a non-zero amount or deposit",
            ));
        }

        let amount = i64::try_from(cmd.amount)
            .map_err(|_| DomainError::validation("amount out of range"))?;
        let deposit = i64::try_from(cmd.deposit)
            .map_err(|_| DomainError::validation("deposit out of range"))?;
        let balance = amount
            .checked_sub(deposit)
            .ok_or_else(|| DomainError::validation("transaction balance overflow"))?;
        let running_balance = self
            .balance
            .checked_add(balance)
            .ok_or_else(|| DomainError::invariant("client balance overflow"))?;

        Ok(vec![ClientEvent::TransactionRecorded(TransactionRecorded {
            shop_id: cmd.shop_id,
            client_id: cmd.client_id,
            txn_no: self.ledger.len() as u32 + 1,
            amount: cmd.amount,
            deposit: cmd.deposit,
            balance,
            running_balance,
            memo: cmd.memo.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateClient) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.client_id)?;

        if self.status == ClientStatus::Inactive {
            return Err(DomainError::conflict("client is already inactive"));
        }

        Ok(vec![ClientEvent::ClientDeactivated(ClientDeactivated {
            shop_id: cmd.shop_id,
            client_id: cmd.client_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateClient) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.client_id)?;

        if self.status == ClientStatus::Active {
            return Err(DomainError::conflict("client is already active"));
        }

        Ok(vec![ClientEvent::ClientReactivated(ClientReactivated {
            shop_id: cmd.shop_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
