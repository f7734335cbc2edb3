//! The delivery contract.
//!
//! Single authoritative source of custody truth. Every operation is
//! deterministic, validates against the state read from the ledger, and on
//! success stages exactly one write plus its typed events. Caller identity
//! comes from the endorsing certificate only.

use parceltrace_types::{
    op_names, validate_weight, CancelDeliveryArgs, CancelHandoffArgs, ConfirmHandoffArgs,
    CreateDeliveryArgs, CustodyError, Delivery, DeliveryCreated, DeliveryEvent, DeliveryId,
    DeliveryStatus, DeliveryStatusChanged, DisputeHandoffArgs, GetDeliveryHistoryArgs,
    HandoffConfirmed, HandoffDisputed, HandoffInitiated, HistoryRecord, InitiateHandoffArgs,
    PendingHandoff, QueryByCustodianArgs, QueryByStatusArgs, ReadDeliveryArgs, Result, Role,
    UpdateLocationArgs, MAX_DISPUTE_REASON_LEN,
};

use crate::context::TransactionContext;

/// The delivery state machine contract.
pub struct DeliveryContract;

impl DeliveryContract {
    /// Dispatch a named operation with a JSON argument document.
    ///
    /// Returns the operation's JSON result. Mutations must arrive through
    /// `submit`; the platform routes queries through `evaluate` (see
    /// [`is_mutation`]).
    pub fn invoke(ctx: &mut TransactionContext<'_>, fn_name: &str, args: &[u8]) -> Result<Vec<u8>> {
        fn parse<T: serde::de::DeserializeOwned>(args: &[u8]) -> Result<T> {
            serde_json::from_slice(args)
                .map_err(|e| CustodyError::invalid_argument("args", e.to_string()))
        }
        fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
            serde_json::to_vec(value)
                .map_err(|e| CustodyError::internal(format!("result encode: {}", e)))
        }

        match fn_name {
            op_names::CREATE_DELIVERY => encode(&Self::create_delivery(ctx, parse(args)?)?),
            op_names::READ_DELIVERY => encode(&Self::read_delivery(ctx, parse(args)?)?),
            op_names::UPDATE_LOCATION => encode(&Self::update_location(ctx, parse(args)?)?),
            op_names::INITIATE_HANDOFF => encode(&Self::initiate_handoff(ctx, parse(args)?)?),
            op_names::CONFIRM_HANDOFF => encode(&Self::confirm_handoff(ctx, parse(args)?)?),
            op_names::DISPUTE_HANDOFF => encode(&Self::dispute_handoff(ctx, parse(args)?)?),
            op_names::CANCEL_HANDOFF => encode(&Self::cancel_handoff(ctx, parse(args)?)?),
            op_names::CANCEL_DELIVERY => encode(&Self::cancel_delivery(ctx, parse(args)?)?),
            op_names::QUERY_DELIVERIES_BY_CUSTODIAN => {
                encode(&Self::query_by_custodian(ctx, parse(args)?)?)
            }
            op_names::QUERY_DELIVERIES_BY_STATUS => {
                encode(&Self::query_by_status(ctx, parse(args)?)?)
            }
            op_names::GET_DELIVERY_HISTORY => encode(&Self::get_history(ctx, parse(args)?)?),
            other => Err(CustodyError::invalid_argument(
                "function",
                format!("unknown chaincode function '{}'", other),
            )),
        }
    }

    /// Whether a function writes state (must be submitted, not evaluated).
    pub fn is_mutation(fn_name: &str) -> bool {
        matches!(
            fn_name,
            op_names::CREATE_DELIVERY
                | op_names::UPDATE_LOCATION
                | op_names::INITIATE_HANDOFF
                | op_names::CONFIRM_HANDOFF
                | op_names::DISPUTE_HANDOFF
                | op_names::CANCEL_HANDOFF
                | op_names::CANCEL_DELIVERY
        )
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn create_delivery(
        ctx: &mut TransactionContext<'_>,
        args: CreateDeliveryArgs,
    ) -> Result<Delivery> {
        let (caller_id, caller_role) = ctx.caller()?;
        if caller_role != Role::Seller {
            return Err(CustodyError::not_authorized(
                "only a SELLER may create a delivery",
            ));
        }

        let delivery_id = DeliveryId::parse(&args.delivery_id)?;
        if args.order_id.trim().is_empty() {
            return Err(CustodyError::invalid_argument("orderId", "must be non-empty"));
        }
        if args.customer_id.trim().is_empty() {
            return Err(CustodyError::invalid_argument("customerId", "must be non-empty"));
        }
        if args.customer_id == caller_id {
            return Err(CustodyError::invalid_argument(
                "customerId",
                "seller cannot be its own customer",
            ));
        }
        validate_weight(args.package_weight)?;
        args.package_dimensions.validate()?;
        args.last_location.validate()?;

        if ctx.get_delivery(&delivery_id)?.is_some() {
            return Err(CustodyError::conflict("Delivery", delivery_id.as_str()));
        }

        let caller_id = caller_id.to_string();
        let delivery = Delivery {
            delivery_id: delivery_id.clone(),
            order_id: args.order_id,
            seller_id: caller_id.clone(),
            customer_id: args.customer_id,
            package_weight: args.package_weight,
            package_dimensions: args.package_dimensions,
            delivery_status: DeliveryStatus::PendingPickup,
            last_location: args.last_location,
            current_custodian_id: caller_id,
            current_custodian_role: Role::Seller,
            pending_handoff: None,
            updated_at: ctx.timestamp(),
        };
        ctx.put_delivery(&delivery)?;
        ctx.emit(DeliveryEvent::Created(DeliveryCreated {
            delivery_id,
            order_id: delivery.order_id.clone(),
            new_status: delivery.delivery_status,
            timestamp: ctx.timestamp(),
        }))?;

        tracing::debug!(
            delivery_id = %delivery.delivery_id,
            seller_id = %delivery.seller_id,
            "delivery created"
        );
        Ok(delivery)
    }

    pub fn update_location(
        ctx: &mut TransactionContext<'_>,
        args: UpdateLocationArgs,
    ) -> Result<Delivery> {
        let (caller_id, caller_role) = ctx.caller()?;
        args.last_location.validate()?;

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        Self::ensure_live(&delivery)?;

        if delivery.current_custodian_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the current custodian may report location",
            ));
        }
        if caller_role != Role::DeliveryPerson {
            return Err(CustodyError::not_authorized(
                "only a DELIVERY_PERSON may report location",
            ));
        }
        if delivery.delivery_status != DeliveryStatus::InTransit {
            return Err(CustodyError::invalid_state(format!(
                "location updates require IN_TRANSIT, delivery is {}",
                delivery.delivery_status
            )));
        }

        delivery.last_location = args.last_location;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;
        // Location is not a status change; no event.
        Ok(delivery)
    }

    pub fn initiate_handoff(
        ctx: &mut TransactionContext<'_>,
        args: InitiateHandoffArgs,
    ) -> Result<Delivery> {
        let (caller_id, caller_role) = ctx.caller()?;
        let caller_id = caller_id.to_string();

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        Self::ensure_live(&delivery)?;

        if delivery.current_custodian_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the current custodian may initiate a handoff",
            ));
        }
        if !matches!(caller_role, Role::Seller | Role::DeliveryPerson) {
            return Err(CustodyError::not_authorized(
                "only SELLER or DELIVERY_PERSON may initiate a handoff",
            ));
        }
        if !matches!(args.to_role, Role::DeliveryPerson | Role::Customer) {
            return Err(CustodyError::invalid_argument(
                "toRole",
                "handoff target must be DELIVERY_PERSON or CUSTOMER",
            ));
        }
        if args.to_user_id.trim().is_empty() {
            return Err(CustodyError::invalid_argument("toUserId", "must be non-empty"));
        }
        if args.to_user_id == caller_id {
            return Err(CustodyError::invalid_argument(
                "toUserId",
                "cannot hand off to yourself",
            ));
        }
        if delivery.pending_handoff.is_some() {
            return Err(CustodyError::invalid_state(
                "a handoff is already pending for this delivery",
            ));
        }
        if args.to_role == Role::Customer && args.to_user_id != delivery.customer_id {
            return Err(CustodyError::invalid_argument(
                "toUserId",
                "customer handoff must target the delivery's customer",
            ));
        }

        let old_status = delivery.delivery_status;
        let new_status = match (old_status, args.to_role) {
            (DeliveryStatus::PendingPickup, Role::DeliveryPerson) => {
                DeliveryStatus::PendingPickupHandoff
            }
            (DeliveryStatus::PendingPickup, _) => {
                return Err(CustodyError::invalid_argument(
                    "toRole",
                    "pickup handoff must target a DELIVERY_PERSON",
                ));
            }
            (DeliveryStatus::InTransit, Role::DeliveryPerson) => {
                DeliveryStatus::PendingTransitHandoff
            }
            (DeliveryStatus::InTransit, Role::Customer) => {
                DeliveryStatus::PendingDeliveryConfirmation
            }
            (status, _) => {
                return Err(CustodyError::invalid_state(format!(
                    "cannot initiate a handoff from {}",
                    status
                )));
            }
        };

        delivery.pending_handoff = Some(PendingHandoff {
            from_user_id: caller_id.clone(),
            from_role: caller_role,
            to_user_id: args.to_user_id.clone(),
            to_role: args.to_role,
            initiated_at: ctx.timestamp(),
        });
        delivery.delivery_status = new_status;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;

        ctx.emit(DeliveryEvent::HandoffInitiated(HandoffInitiated {
            delivery_id: id.clone(),
            from_user_id: caller_id,
            to_user_id: args.to_user_id,
            to_role: args.to_role,
            timestamp: ctx.timestamp(),
        }))?;
        Self::emit_status_change(ctx, &delivery, old_status)?;
        Ok(delivery)
    }

    pub fn confirm_handoff(
        ctx: &mut TransactionContext<'_>,
        args: ConfirmHandoffArgs,
    ) -> Result<Delivery> {
        let (caller_id, _) = ctx.caller()?;
        let caller_id = caller_id.to_string();
        args.last_location.validate()?;
        validate_weight(args.package_weight)?;
        args.package_dimensions.validate()?;

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        let handoff = Self::require_pending(&delivery)?;

        if handoff.to_user_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the handoff target may confirm",
            ));
        }

        let old_status = delivery.delivery_status;
        let new_status = match handoff.to_role {
            Role::DeliveryPerson => DeliveryStatus::InTransit,
            Role::Customer => DeliveryStatus::ConfirmedDelivery,
            // Unreachable for a well-formed record; initiate validates toRole.
            other => {
                return Err(CustodyError::internal(format!(
                    "pending handoff has non-custodial target role {}",
                    other
                )));
            }
        };
        let from_user_id = handoff.from_user_id.clone();
        let to_role = handoff.to_role;

        delivery.current_custodian_id = caller_id.clone();
        delivery.current_custodian_role = to_role;
        delivery.last_location = args.last_location;
        delivery.package_weight = args.package_weight;
        delivery.package_dimensions = args.package_dimensions;
        delivery.delivery_status = new_status;
        delivery.pending_handoff = None;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;

        ctx.emit(DeliveryEvent::HandoffConfirmed(HandoffConfirmed {
            delivery_id: id,
            from_user_id,
            to_user_id: caller_id.clone(),
            new_custodian_id: caller_id,
            timestamp: ctx.timestamp(),
        }))?;
        Self::emit_status_change(ctx, &delivery, old_status)?;
        Ok(delivery)
    }

    pub fn dispute_handoff(
        ctx: &mut TransactionContext<'_>,
        args: DisputeHandoffArgs,
    ) -> Result<Delivery> {
        let (caller_id, _) = ctx.caller()?;
        let caller_id = caller_id.to_string();
        if args.reason.trim().is_empty() || args.reason.len() > MAX_DISPUTE_REASON_LEN {
            return Err(CustodyError::invalid_argument(
                "reason",
                format!("must be non-empty and <= {} chars", MAX_DISPUTE_REASON_LEN),
            ));
        }

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        let handoff = Self::require_pending(&delivery)?;

        if handoff.to_user_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the handoff target may dispute",
            ));
        }

        let old_status = delivery.delivery_status;
        let new_status = old_status.disputed_counterpart().ok_or_else(|| {
            CustodyError::invalid_state(format!("cannot dispute from {}", old_status))
        })?;

        // Custody stays with the initiator.
        delivery.delivery_status = new_status;
        delivery.pending_handoff = None;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;

        ctx.emit(DeliveryEvent::HandoffDisputed(HandoffDisputed {
            delivery_id: id,
            disputed_by: caller_id,
            reason: args.reason,
            timestamp: ctx.timestamp(),
        }))?;
        Self::emit_status_change(ctx, &delivery, old_status)?;
        Ok(delivery)
    }

    pub fn cancel_handoff(
        ctx: &mut TransactionContext<'_>,
        args: CancelHandoffArgs,
    ) -> Result<Delivery> {
        let (caller_id, _) = ctx.caller()?;

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        let handoff = Self::require_pending(&delivery)?;

        if handoff.from_user_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the handoff initiator may cancel",
            ));
        }

        let old_status = delivery.delivery_status;
        let new_status = old_status.cancel_reversion().ok_or_else(|| {
            CustodyError::invalid_state(format!("cannot cancel a handoff from {}", old_status))
        })?;

        delivery.delivery_status = new_status;
        delivery.pending_handoff = None;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;

        Self::emit_status_change(ctx, &delivery, old_status)?;
        Ok(delivery)
    }

    pub fn cancel_delivery(
        ctx: &mut TransactionContext<'_>,
        args: CancelDeliveryArgs,
    ) -> Result<Delivery> {
        let (caller_id, caller_role) = ctx.caller()?;

        let id = DeliveryId::parse(&args.delivery_id)?;
        let mut delivery = ctx.require_delivery(&id)?;
        Self::ensure_live(&delivery)?;

        if caller_role != Role::Customer || delivery.customer_id != caller_id {
            return Err(CustodyError::not_authorized(
                "only the delivery's customer may cancel it",
            ));
        }
        if delivery.delivery_status != DeliveryStatus::PendingPickup {
            return Err(CustodyError::invalid_state(format!(
                "cancellation requires PENDING_PICKUP, delivery is {}",
                delivery.delivery_status
            )));
        }

        let old_status = delivery.delivery_status;
        delivery.delivery_status = DeliveryStatus::Cancelled;
        Self::touch(ctx, &mut delivery);
        ctx.put_delivery(&delivery)?;

        Self::emit_status_change(ctx, &delivery, old_status)?;
        Ok(delivery)
    }

    // ========================================================================
    // Queries (evaluated, never ordered)
    // ========================================================================

    pub fn read_delivery(ctx: &TransactionContext<'_>, args: ReadDeliveryArgs) -> Result<Delivery> {
        let (caller_id, caller_role) = ctx.caller()?;
        let id = DeliveryId::parse(&args.delivery_id)?;
        let delivery = ctx.require_delivery(&id)?;
        Self::ensure_visible(&delivery, caller_id, caller_role)?;
        Ok(delivery)
    }

    pub fn query_by_custodian(
        ctx: &TransactionContext<'_>,
        args: QueryByCustodianArgs,
    ) -> Result<Vec<Delivery>> {
        let (caller_id, caller_role) = ctx.caller()?;
        if caller_role != Role::Admin && args.custodian_id != caller_id {
            return Err(CustodyError::not_authorized(
                "custodian queries are restricted to your own deliveries",
            ));
        }
        let deliveries = ctx
            .scan_deliveries()?
            .into_iter()
            .filter(|d| d.current_custodian_id == args.custodian_id)
            .collect();
        Ok(deliveries)
    }

    pub fn query_by_status(
        ctx: &TransactionContext<'_>,
        args: QueryByStatusArgs,
    ) -> Result<Vec<Delivery>> {
        let (caller_id, caller_role) = ctx.caller()?;
        let deliveries = ctx
            .scan_deliveries()?
            .into_iter()
            .filter(|d| d.delivery_status == args.status)
            .filter(|d| caller_role == Role::Admin || d.is_party(caller_id))
            .collect();
        Ok(deliveries)
    }

    pub fn get_history(
        ctx: &TransactionContext<'_>,
        args: GetDeliveryHistoryArgs,
    ) -> Result<Vec<HistoryRecord>> {
        let (caller_id, caller_role) = ctx.caller()?;
        let id = DeliveryId::parse(&args.delivery_id)?;
        let delivery = ctx.require_delivery(&id)?;
        Self::ensure_visible(&delivery, caller_id, caller_role)?;

        let mut records = Vec::new();
        for raw in ctx.history(&id)? {
            let value = match raw.value {
                Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| {
                    CustodyError::internal(format!("corrupt history document {}: {}", id, e))
                })?),
                None => None,
            };
            records.push(HistoryRecord {
                tx_id: raw.tx_id,
                timestamp: raw.timestamp,
                value,
                is_delete: raw.is_delete,
            });
        }
        Ok(records)
    }

    // ========================================================================
    // Shared checks
    // ========================================================================

    /// Terminal statuses are read-only for any further mutation.
    fn ensure_live(delivery: &Delivery) -> Result<()> {
        if delivery.delivery_status.is_terminal() {
            return Err(CustodyError::invalid_state(format!(
                "delivery is terminal ({})",
                delivery.delivery_status
            )));
        }
        Ok(())
    }

    /// A pending handoff, or `INVALID_STATE`. Terminal states fail the same
    /// way: a disputed or completed delivery has no pending handoff.
    fn require_pending(delivery: &Delivery) -> Result<&PendingHandoff> {
        Self::ensure_live(delivery)?;
        delivery
            .pending_handoff
            .as_ref()
            .ok_or_else(|| CustodyError::invalid_state("no handoff is pending for this delivery"))
    }

    fn ensure_visible(delivery: &Delivery, caller_id: &str, caller_role: Role) -> Result<()> {
        if caller_role == Role::Admin || delivery.is_party(caller_id) {
            Ok(())
        } else {
            Err(CustodyError::not_authorized(
                "caller is not a party to this delivery",
            ))
        }
    }

    /// Keep `updatedAt` monotonically non-decreasing per delivery.
    fn touch(ctx: &TransactionContext<'_>, delivery: &mut Delivery) {
        delivery.updated_at = delivery.updated_at.max(ctx.timestamp());
    }

    fn emit_status_change(
        ctx: &mut TransactionContext<'_>,
        delivery: &Delivery,
        old_status: DeliveryStatus,
    ) -> Result<()> {
        if delivery.delivery_status != old_status {
            ctx.emit(DeliveryEvent::StatusChanged(DeliveryStatusChanged {
                delivery_id: delivery.delivery_id.clone(),
                order_id: delivery.order_id.clone(),
                old_status,
                new_status: delivery.delivery_status,
                timestamp: ctx.timestamp(),
            }))?;
        }
        Ok(())
    }
}
