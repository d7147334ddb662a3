//! The bus: signs outbound messages, routes them by jet role, and guards
//! inbound delivery with signature and authorization checks.

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::sync::Arc;

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::message::RoutingToken;
use pulsenet_core::{
    ArcJetCoordinator, ArcPulseManager, CoreError, Message, MessageHandler, MessageSender,
    MessageType, NodeNetwork, Parcel, Reply, SendOptions,
};

use crate::cascade::Cascade;
use crate::routing_token::validate_token;
use crate::transport::Transport;

/// Hash identifying a parcel's message content: replay tapes and delegation
/// tokens are keyed by it.
pub fn message_hash(parcel: &Parcel) -> Result<[u8; 32], CoreError> {
    let mut hasher = Sha3_256::new();
    hasher.update(parcel.signed_bytes()?);
    Ok(hasher.finalize().into())
}

/// Wire frame delivered between buses. The cascade section is present only
/// on multicast sends and tells the receiver which children to forward to.
#[derive(Serialize, Deserialize)]
struct Envelope {
    cascade: Option<Cascade>,
    parcel: Parcel,
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub sign_messages: bool,
    pub replication_factor: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            sign_messages: true,
            replication_factor: 2,
        }
    }
}

pub struct MessageBus {
    handlers: RwLock<HashMap<MessageType, MessageHandler>>,
    sign_messages: bool,
    replication_factor: usize,
    /// Serializes delivery against pulse transitions: dispatch takes a read
    /// scope, pulse advancement takes the write scope.
    global_lock: RwLock<()>,
    crypto: Arc<dyn CryptographyService>,
    nodes: Arc<dyn NodeNetwork>,
    pulses: ArcPulseManager,
    coordinator: ArcJetCoordinator,
    transport: Arc<dyn Transport>,
}

impl MessageBus {
    pub fn new(
        config: BusConfig,
        crypto: Arc<dyn CryptographyService>,
        nodes: Arc<dyn NodeNetwork>,
        pulses: ArcPulseManager,
        coordinator: ArcJetCoordinator,
        transport: Arc<dyn Transport>,
    ) -> Self {
        MessageBus {
            handlers: RwLock::new(HashMap::new()),
            sign_messages: config.sign_messages,
            replication_factor: config.replication_factor,
            global_lock: RwLock::new(()),
            crypto,
            nodes,
            pulses,
            coordinator,
            transport,
        }
    }

    /// One handler per message type. A second registration for the same
    /// type is a wiring bug and is rejected.
    pub fn register(&self, message_type: MessageType, handler: MessageHandler) -> Result<(), CoreError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&message_type) {
            return Err(CoreError::Other(format!(
                "handler for {message_type:?} already registered"
            )));
        }
        handlers.insert(message_type, handler);
        Ok(())
    }

    pub fn register_table(
        &self,
        table: Vec<(MessageType, MessageHandler)>,
    ) -> Result<(), CoreError> {
        for (message_type, handler) in table {
            self.register(message_type, handler)?;
        }
        Ok(())
    }

    /// Block delivery for a pulse transition. Held for the duration of the
    /// returned guard; in-flight dispatches finish first.
    pub fn acquire(&self) -> RwLockWriteGuard<'_, ()> {
        tracing::debug!("acquiring pulse transition lock");
        self.global_lock.write()
    }

    pub fn create_parcel(
        &self,
        message: Message,
        options: Option<&SendOptions>,
    ) -> Result<Parcel, CoreError> {
        let pulse = self.pulses.current()?;
        let signature = if self.sign_messages {
            self.crypto.sign(&message.to_bytes()?)?
        } else {
            Vec::new()
        };
        Ok(Parcel {
            sender: self.nodes.origin().id,
            message,
            signature,
            token: options.and_then(|o| o.token.clone()),
            trace_id: format!("{:016x}", rand::random::<u64>()),
            pulse: pulse.pulse_number,
        })
    }

    pub fn send_parcel(
        &self,
        parcel: Parcel,
        options: Option<&SendOptions>,
    ) -> Result<Reply, CoreError> {
        let _scope = self.global_lock.read();
        let pulse = self.pulses.current()?;
        let origin = self.nodes.origin().id;

        let destinations = match options.and_then(|o| o.receiver) {
            Some(receiver) => vec![receiver],
            None => match parcel.message.target() {
                Some(target) => self.coordinator.query_role(
                    parcel.message.target_role(),
                    &target,
                    pulse.pulse_number,
                )?,
                // untargeted messages are handled by this node itself
                None => vec![origin],
            },
        };

        if destinations.len() > 1 {
            let cascade = Cascade {
                node_ids: destinations,
                entropy: pulse.entropy,
                replication_factor: self.replication_factor,
            };
            return self.send_cascade(cascade, parcel);
        }

        let destination = *destinations
            .first()
            .ok_or_else(|| CoreError::Other("no destination resolved".into()))?;

        // self-addressed sends skip the wire entirely
        if destination == origin {
            return self.dispatch(&parcel);
        }

        let address = self.address_of(&destination)?;
        let bytes = bincode::serialize(&Envelope {
            cascade: None,
            parcel,
        })?;
        let response = self.transport.send(&address, &bytes)?;
        Reply::from_bytes(&response)
    }

    /// Multicast: deliver to the first tree layer; receivers forward to
    /// their children. Fire-and-forget, no reply aggregation.
    fn send_cascade(&self, cascade: Cascade, parcel: Parcel) -> Result<Reply, CoreError> {
        let origin = self.nodes.origin().id;
        let first_layer = cascade.initial_layer();
        let envelope = Envelope {
            cascade: Some(cascade),
            parcel,
        };
        let bytes = bincode::serialize(&envelope)?;
        for destination in first_layer {
            if destination == origin {
                // already inside the delivery scope; going back through
                // deliver would retake the lock and park behind any queued
                // pulse transition
                if let Some(cascade) = &envelope.cascade {
                    self.forward_cascade(cascade, &bytes);
                }
                if let Err(e) = self.dispatch(&envelope.parcel) {
                    tracing::warn!(error = %e, "cascade self delivery failed");
                }
                continue;
            }
            match self.address_of(&destination) {
                Ok(address) => {
                    if let Err(e) = self.transport.send(&address, &bytes) {
                        tracing::warn!(node = %destination, error = %e, "cascade send failed");
                    }
                }
                Err(e) => tracing::warn!(node = %destination, error = %e, "cascade send skipped"),
            }
        }
        Ok(Reply::Ok)
    }

    /// Inbound RPC entry point. Security rejections come back as errors and
    /// never reach a handler; handler failures are serialized into an error
    /// reply for the remote caller to unwrap.
    pub fn deliver(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let envelope: Envelope = bincode::deserialize(data)?;
        let _scope = self.global_lock.read();
        let parcel = &envelope.parcel;

        let sender = self
            .nodes
            .active_node(&parcel.sender)
            .ok_or_else(|| CoreError::Unauthorized("sender is not an active node".into()))?;

        if self.sign_messages
            && !self
                .crypto
                .verify(&sender.public_key, &parcel.signature, &parcel.signed_bytes()?)
        {
            return Err(CoreError::InvalidSignature);
        }

        match &parcel.token {
            Some(token) => self.verify_token(parcel, token)?,
            None => {
                if let Some((object, role)) = parcel.message.allowed_sender() {
                    let pulse = self.pulses.current()?;
                    let authorized = self.coordinator.is_authorized(
                        role,
                        &object,
                        pulse.pulse_number,
                        &parcel.sender,
                    )?;
                    if !authorized {
                        return Err(CoreError::Unauthorized(
                            "sender is not allowed to act on behalf of that object".into(),
                        ));
                    }
                }
            }
        }

        if let Some(cascade) = &envelope.cascade {
            self.forward_cascade(cascade, data);
        }

        let reply = match self.dispatch(parcel) {
            Ok(reply) => reply,
            Err(e) => Reply::Error(e.to_string()),
        };
        reply.to_bytes()
    }

    fn verify_token(&self, parcel: &Parcel, token: &RoutingToken) -> Result<(), CoreError> {
        let granter = self
            .nodes
            .active_node(&token.from)
            .ok_or(CoreError::InvalidToken)?;
        let hash = message_hash(parcel)?;
        validate_token(self.crypto.as_ref(), &granter.public_key, token, &hash)
    }

    fn forward_cascade(&self, cascade: &Cascade, data: &[u8]) {
        let origin = self.nodes.origin().id;
        for child in cascade.next_layer(&origin) {
            match self.address_of(&child) {
                Ok(address) => {
                    if let Err(e) = self.transport.send(&address, data) {
                        tracing::warn!(node = %child, error = %e, "cascade forward failed");
                    }
                }
                Err(e) => tracing::warn!(node = %child, error = %e, "cascade forward skipped"),
            }
        }
    }

    fn dispatch(&self, parcel: &Parcel) -> Result<Reply, CoreError> {
        let handlers = self.handlers.read();
        let handler = handlers.get(&parcel.message_type()).ok_or_else(|| {
            CoreError::Other(format!(
                "no handler for message type {:?}",
                parcel.message_type()
            ))
        })?;
        handler(parcel)
    }

    fn address_of(&self, id: &pulsenet_core::types::RecordRef) -> Result<String, CoreError> {
        self.nodes
            .active_node(id)
            .map(|n| n.physical_address)
            .ok_or(CoreError::NodeMissing)
    }
}

impl MessageSender for MessageBus {
    fn send(&self, message: Message, options: Option<SendOptions>) -> Result<Reply, CoreError> {
        let parcel = self.create_parcel(message, options.as_ref())?;
        self.send_parcel(parcel, options.as_ref())
    }
}
