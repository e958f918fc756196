// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Entitlement & Lifecycle Engine
//!
//! Covers boundary conditions in:
//! - Razorpay payload normalization (both entity shapes, attribution)
//! - Stripe payload normalization (session vs intent events)
//! - Razorpay signature verification
//! - Idempotency key collisions across providers and events

#[cfg(test)]
mod razorpay_normalize_tests {
    use crate::providers::{PaymentEventType, ProviderAdapter, RazorpayAdapter};
    use crate::BillingError;
    use uuid::Uuid;

    fn adapter() -> RazorpayAdapter {
        RazorpayAdapter::new("rzp_whsec_test")
    }

    fn captured_payload(tenant: Uuid, plan: Uuid) -> String {
        format!(
            r#"{{
                "event": "payment.captured",
                "payload": {{
                    "payment": {{
                        "entity": {{
                            "id": "pay_123",
                            "order_id": "order_456",
                            "status": "captured",
                            "notes": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                        }}
                    }}
                }}
            }}"#
        )
    }

    // =========================================================================
    // Wrapped entity shape - the standard webhook delivery
    // =========================================================================
    #[test]
    fn test_captured_with_entity_wrapper() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let event = adapter()
            .normalize(captured_payload(tenant, plan).as_bytes())
            .unwrap()
            .expect("payment.captured should normalize");

        assert_eq!(event.event_type, PaymentEventType::PaymentCaptured);
        assert_eq!(event.provider_order_id, "order_456");
        assert_eq!(event.provider_payment_id, "pay_123");
        assert_eq!(event.tenant_id, tenant);
        assert_eq!(event.plan_id, plan);
        assert_eq!(event.idempotency_key(), "razorpay:order_456:pay_123");
    }

    // =========================================================================
    // Direct entity shape - no wrapper
    // =========================================================================
    #[test]
    fn test_captured_with_direct_entity() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "event": "payment.captured",
                "payload": {{
                    "payment": {{
                        "id": "pay_123",
                        "order_id": "order_456",
                        "notes": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                    }}
                }}
            }}"#
        );

        let event = adapter()
            .normalize(payload.as_bytes())
            .unwrap()
            .expect("direct entity shape should normalize");
        assert_eq!(event.provider_payment_id, "pay_123");
        assert_eq!(event.tenant_id, tenant);
    }

    // =========================================================================
    // order.paid carries attribution on the order, payment id alongside
    // =========================================================================
    #[test]
    fn test_order_paid_event() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "event": "order.paid",
                "payload": {{
                    "order": {{
                        "entity": {{
                            "id": "order_456",
                            "notes": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                        }}
                    }},
                    "payment": {{
                        "entity": {{ "id": "pay_123", "order_id": "order_456" }}
                    }}
                }}
            }}"#
        );

        let event = adapter()
            .normalize(payload.as_bytes())
            .unwrap()
            .expect("order.paid should normalize");
        assert_eq!(event.event_type, PaymentEventType::OrderPaid);
        assert_eq!(event.provider_order_id, "order_456");
        assert_eq!(event.provider_payment_id, "pay_123");
    }

    // =========================================================================
    // Missing notes -> unattributable, never retried
    // =========================================================================
    #[test]
    fn test_missing_tenant_note_is_unattributable() {
        let payload = r#"{
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_1", "order_id": "order_1", "notes": {} }
                }
            }
        }"#;

        let err = adapter().normalize(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Unattributable(_)), "{err:?}");
    }

    // =========================================================================
    // Razorpay sends notes as [] when empty
    // =========================================================================
    #[test]
    fn test_empty_array_notes_is_unattributable() {
        let payload = r#"{
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_1", "order_id": "order_1", "notes": [] }
                }
            }
        }"#;

        let err = adapter().normalize(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Unattributable(_)));
    }

    #[test]
    fn test_malformed_tenant_uuid_is_unattributable() {
        let payload = r#"{
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_1",
                        "order_id": "order_1",
                        "notes": { "tenant_id": "not-a-uuid", "plan_id": "also-bad" }
                    }
                }
            }
        }"#;

        let err = adapter().normalize(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Unattributable(_)));
    }

    // =========================================================================
    // Event types the engine does not act on are ignored, not errors
    // =========================================================================
    #[test]
    fn test_unhandled_event_type_ignored() {
        let payload = r#"{ "event": "refund.processed", "payload": {} }"#;
        assert!(adapter().normalize(payload.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_payload_is_invalid() {
        let err = adapter().normalize(b"not json at all").unwrap_err();
        assert!(matches!(err, BillingError::InvalidPayload(_)));
    }
}

#[cfg(test)]
mod razorpay_signature_tests {
    use crate::providers::{ProviderAdapter, RazorpayAdapter};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(payload: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let adapter = RazorpayAdapter::new("rzp_secret");
        let payload = br#"{"event":"payment.captured"}"#;
        let signature = sign(payload, "rzp_secret");
        assert!(adapter.verify_signature(payload, &signature).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let adapter = RazorpayAdapter::new("rzp_secret");
        let payload = br#"{"event":"payment.captured"}"#;
        let signature = sign(payload, "other_secret");
        assert!(adapter.verify_signature(payload, &signature).is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let adapter = RazorpayAdapter::new("rzp_secret");
        let signature = sign(br#"{"amount":100}"#, "rzp_secret");
        assert!(adapter
            .verify_signature(br#"{"amount":999}"#, &signature)
            .is_err());
    }

    #[test]
    fn test_empty_signature_rejected() {
        let adapter = RazorpayAdapter::new("rzp_secret");
        assert!(adapter.verify_signature(b"{}", "").is_err());
    }
}

#[cfg(test)]
mod stripe_normalize_tests {
    use crate::providers::{PaymentEventType, ProviderAdapter, StripeAdapter};
    use crate::BillingError;
    use uuid::Uuid;

    fn adapter() -> StripeAdapter {
        StripeAdapter::new("whsec_test")
    }

    #[test]
    fn test_checkout_session_completed() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "type": "checkout.session.completed",
                "data": {{
                    "object": {{
                        "id": "cs_test_1",
                        "payment_intent": "pi_test_1",
                        "metadata": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                    }}
                }}
            }}"#
        );

        let event = adapter()
            .normalize(payload.as_bytes())
            .unwrap()
            .expect("session should normalize");
        assert_eq!(event.event_type, PaymentEventType::OrderPaid);
        assert_eq!(event.provider_order_id, "cs_test_1");
        assert_eq!(event.provider_payment_id, "pi_test_1");
        assert_eq!(event.idempotency_key(), "stripe:cs_test_1:pi_test_1");
    }

    #[test]
    fn test_entity_wrapped_object_shape() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "type": "checkout.session.completed",
                "data": {{
                    "object": {{
                        "entity": {{
                            "id": "cs_test_2",
                            "payment_intent": "pi_test_2",
                            "metadata": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                        }}
                    }}
                }}
            }}"#
        );

        let event = adapter()
            .normalize(payload.as_bytes())
            .unwrap()
            .expect("wrapped shape should normalize");
        assert_eq!(event.provider_order_id, "cs_test_2");
    }

    #[test]
    fn test_payment_intent_failed() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "type": "payment_intent.payment_failed",
                "data": {{
                    "object": {{
                        "id": "pi_test_9",
                        "latest_charge": "ch_test_9",
                        "metadata": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                    }}
                }}
            }}"#
        );

        let event = adapter()
            .normalize(payload.as_bytes())
            .unwrap()
            .expect("failed intent should normalize");
        assert_eq!(event.event_type, PaymentEventType::PaymentFailed);
        assert_eq!(event.provider_order_id, "pi_test_9");
        assert_eq!(event.provider_payment_id, "ch_test_9");
    }

    #[test]
    fn test_intent_without_charge_falls_back_to_intent_id() {
        let tenant = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let payload = format!(
            r#"{{
                "type": "payment_intent.succeeded",
                "data": {{
                    "object": {{
                        "id": "pi_test_5",
                        "metadata": {{ "tenant_id": "{tenant}", "plan_id": "{plan}" }}
                    }}
                }}
            }}"#
        );

        let event = adapter().normalize(payload.as_bytes()).unwrap().unwrap();
        assert_eq!(event.provider_payment_id, "pi_test_5");
    }

    #[test]
    fn test_missing_metadata_is_unattributable() {
        let payload = r#"{
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_3", "metadata": {} } }
        }"#;

        let err = adapter().normalize(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Unattributable(_)));
    }

    #[test]
    fn test_unhandled_event_type_ignored() {
        let payload = r#"{ "type": "invoice.finalized", "data": { "object": { "id": "in_1" } } }"#;
        assert!(adapter().normalize(payload.as_bytes()).unwrap().is_none());
    }
}

#[cfg(test)]
mod idempotency_key_tests {
    use crate::providers::{PaymentEvent, PaymentEventType, ProviderName};
    use uuid::Uuid;

    fn event(
        provider: ProviderName,
        event_type: PaymentEventType,
        order: &str,
        payment: &str,
    ) -> PaymentEvent {
        PaymentEvent {
            provider,
            event_type,
            provider_order_id: order.to_string(),
            provider_payment_id: payment.to_string(),
            tenant_id: Uuid::nil(),
            plan_id: Uuid::nil(),
            raw_payload_digest: String::new(),
        }
    }

    // =========================================================================
    // Replays of the same delivery collapse to one key
    // =========================================================================
    #[test]
    fn test_replay_has_identical_key() {
        let a = event(
            ProviderName::Razorpay,
            PaymentEventType::PaymentCaptured,
            "o1",
            "p1",
        );
        let b = event(
            ProviderName::Razorpay,
            PaymentEventType::PaymentCaptured,
            "o1",
            "p1",
        );
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    // =========================================================================
    // payment.captured and order.paid for one purchase are distinct keys;
    // the orchestrator's order-level idempotence handles that pair
    // =========================================================================
    #[test]
    fn test_key_ignores_event_type() {
        let captured = event(
            ProviderName::Razorpay,
            PaymentEventType::PaymentCaptured,
            "o1",
            "p1",
        );
        let paid = event(ProviderName::Razorpay, PaymentEventType::OrderPaid, "o1", "p1");
        assert_eq!(captured.idempotency_key(), paid.idempotency_key());
    }

    #[test]
    fn test_different_payments_have_different_keys() {
        let first = event(
            ProviderName::Razorpay,
            PaymentEventType::PaymentCaptured,
            "o1",
            "p1",
        );
        let retried = event(
            ProviderName::Razorpay,
            PaymentEventType::PaymentCaptured,
            "o1",
            "p2",
        );
        assert_ne!(first.idempotency_key(), retried.idempotency_key());
    }
}
