//! Subscription pump: receive messages of one kind, decode them, dispatch to
//! the matching handler and turn the outcome into an ack or a nack.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use mailer_broker::{AckDecision, Broker, BrokerError, Message, Subscription};
use mailer_common::codec::Payload;
use mailer_common::types::{EmailPayload, PayloadKind, UserPayload, VerificationEmailPayload};

use crate::delivery::Mailer;
use crate::handlers::EmailHandlers;

/// Coarse lifecycle of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Receiving,
    Stopped,
}

pub struct SubscriptionPump<B, M> {
    broker: Arc<B>,
    subscription: Subscription,
    kind: PayloadKind,
    handlers: Arc<EmailHandlers<M>>,
    state: watch::Sender<PumpState>,
}

impl<B: Broker, M: Mailer> SubscriptionPump<B, M> {
    pub fn new(
        broker: Arc<B>,
        subscription: Subscription,
        kind: PayloadKind,
        handlers: Arc<EmailHandlers<M>>,
    ) -> Self {
        let (state, _) = watch::channel(PumpState::Idle);
        Self {
            broker,
            subscription,
            kind,
            handlers,
            state,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn state(&self) -> watch::Receiver<PumpState> {
        self.state.subscribe()
    }

    /// Receive until `cancel` fires or the broker fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BrokerError> {
        let kind = self.kind;
        let handlers = Arc::clone(&self.handlers);

        tracing::info!(
            subscription = self.subscription.name(),
            %kind,
            "Starting subscription pump"
        );
        self.state.send_replace(PumpState::Receiving);

        let result = self
            .broker
            .receive(&self.subscription, cancel, move |message| {
                let handlers = Arc::clone(&handlers);
                async move { dispatch(&handlers, kind, &message).await }
            })
            .await;

        self.state.send_replace(PumpState::Stopped);
        match &result {
            Ok(()) => tracing::info!(subscription = self.subscription.name(), "Subscription pump stopped"),
            Err(e) => tracing::error!(
                subscription = self.subscription.name(),
                error = %e,
                "Subscription pump failed"
            ),
        }

        result
    }
}

fn decode<P: Payload>(message: &Message) -> Option<P> {
    match P::decode(&message.data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::error!(
                message_id = %message.id,
                delivery_attempt = message.delivery_attempt,
                error = %e,
                "Failed to decode message"
            );
            None
        }
    }
}

/// Decode `message` as `kind` and run its handler.
///
/// Undecodable messages are nacked without reaching a handler.
pub async fn dispatch<M: Mailer>(
    handlers: &EmailHandlers<M>,
    kind: PayloadKind,
    message: &Message,
) -> AckDecision {
    let outcome = match kind {
        PayloadKind::Email => {
            let Some(payload) = decode::<EmailPayload>(message) else {
                return AckDecision::Nack;
            };
            handlers.handle_email(&payload).await
        }
        PayloadKind::Verification => {
            let Some(payload) = decode::<VerificationEmailPayload>(message) else {
                return AckDecision::Nack;
            };
            handlers.handle_verification(&payload).await
        }
        PayloadKind::UserCreated => {
            let Some(payload) = decode::<UserPayload>(message) else {
                return AckDecision::Nack;
            };
            handlers.handle_user_created(&payload).await
        }
    };

    match outcome {
        Ok(()) => AckDecision::Ack,
        Err(e) => {
            tracing::error!(message_id = %message.id, %kind, error = %e, "Handler failed");
            AckDecision::Nack
        }
    }
}
