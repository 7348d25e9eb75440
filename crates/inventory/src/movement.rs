use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, DomainError, UserId, domain_id};
use stockflow_orders::OrderId;
use stockflow_products::ProductId;

domain_id!(
    /// Stock movement identifier.
    MovementId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    /// Signed correction: `quantity` is the delta applied to on-hand stock.
    Adjustment,
    Reserved,
    Released,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Reserved => "reserved",
            MovementType::Released => "released",
        }
    }

    /// On-hand stock after a movement of this type.
    ///
    /// Reservations only move stock between buckets, so on-hand is unchanged.
    pub fn apply(self, previous_stock: i64, quantity: i64) -> i64 {
        match self {
            MovementType::In | MovementType::Adjustment => previous_stock + quantity,
            MovementType::Out => previous_stock - quantity,
            MovementType::Reserved | MovementType::Released => previous_stock,
        }
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjustment" => Ok(MovementType::Adjustment),
            "reserved" => Ok(MovementType::Reserved),
            "released" => Ok(MovementType::Released),
            other => Err(DomainError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Order,
    Adjustment,
    Initial,
    Return,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::Order => "order",
            ReferenceType::Adjustment => "adjustment",
            ReferenceType::Initial => "initial",
            ReferenceType::Return => "return",
        }
    }
}

impl core::str::FromStr for ReferenceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(ReferenceType::Order),
            "adjustment" => Ok(ReferenceType::Adjustment),
            "initial" => Ok(ReferenceType::Initial),
            "return" => Ok(ReferenceType::Return),
            other => Err(DomainError::validation(format!("unknown reference type '{other}'"))),
        }
    }
}

/// Immutable ledger entry recording one change to a product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<AggregateId>,
    pub reason: Option<String>,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Outbound movement deducting `quantity` for an order.
    pub fn order_out(
        product_id: ProductId,
        quantity: i64,
        previous_stock: i64,
        order_id: OrderId,
        order_number: &str,
        created_by: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::generate(),
            product_id,
            movement_type: MovementType::Out,
            quantity,
            reference_type: Some(ReferenceType::Order),
            reference_id: Some(order_id.0),
            reason: Some(format!("order {order_number}")),
            previous_stock,
            new_stock: MovementType::Out.apply(previous_stock, quantity),
            created_by,
            created_at,
        }
    }

    /// Opening balance recorded when a product is created with stock on hand.
    pub fn initial(
        product_id: ProductId,
        quantity: i64,
        created_by: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::generate(),
            product_id,
            movement_type: MovementType::In,
            quantity,
            reference_type: Some(ReferenceType::Initial),
            reference_id: Some(product_id.0),
            reason: Some("initial stock".to_string()),
            previous_stock: 0,
            new_stock: quantity,
            created_by,
            created_at,
        }
    }

    pub fn references_order(&self, order_id: OrderId) -> bool {
        self.reference_type == Some(ReferenceType::Order) && self.reference_id == Some(order_id.0)
    }

    /// Whether `new_stock` follows from `previous_stock` for this movement type.
    pub fn is_arithmetically_consistent(&self) -> bool {
        self.movement_type.apply(self.previous_stock, self.quantity) == self.new_stock
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreakKind {
    /// `previous_stock` does not continue from the prior movement's `new_stock`.
    Discontinuity { expected_previous: i64, actual_previous: i64 },
    /// `new_stock` does not follow from `previous_stock` and `quantity`.
    Arithmetic { expected_new: i64, actual_new: i64 },
}

/// First inconsistency found in a product's movement history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub kind: ChainBreakKind,
}

impl core::fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ChainBreakKind::Discontinuity {
                expected_previous,
                actual_previous,
            } => write!(
                f,
                "movement {} for product {}: previous_stock {} does not continue from {}",
                self.movement_id, self.product_id, actual_previous, expected_previous
            ),
            ChainBreakKind::Arithmetic {
                expected_new,
                actual_new,
            } => write!(
                f,
                "movement {} for product {}: new_stock {} should be {}",
                self.movement_id, self.product_id, actual_new, expected_new
            ),
        }
    }
}

/// Check that a ledger is internally consistent.
///
/// `movements` must be oldest-first (reverse of the newest-first ledger
/// read); products are checked independently. The first movement seen for a
/// product anchors its chain.
pub fn verify_chain(movements: &[StockMovement]) -> Result<(), ChainBreak> {
    let mut last_new: std::collections::HashMap<ProductId, i64> = Default::default();

    for m in movements {
        if let Some(&expected_previous) = last_new.get(&m.product_id) {
            if m.previous_stock != expected_previous {
                return Err(ChainBreak {
                    movement_id: m.id,
                    product_id: m.product_id,
                    kind: ChainBreakKind::Discontinuity {
                        expected_previous,
                        actual_previous: m.previous_stock,
                    },
                });
            }
        }

        let expected_new = m.movement_type.apply(m.previous_stock, m.quantity);
        if expected_new != m.new_stock {
            return Err(ChainBreak {
                movement_id: m.id,
                product_id: m.product_id,
                kind: ChainBreakKind::Arithmetic {
                    expected_new,
                    actual_new: m.new_stock,
                },
            });
        }

        last_new.insert(m.product_id, m.new_stock);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn out(product_id: ProductId, qty: i64, previous: i64) -> StockMovement {
        StockMovement::order_out(
            product_id,
            qty,
            previous,
            OrderId::generate(),
            "PO-7",
            None,
            test_time(),
        )
    }

    #[test]
    fn order_out_records_reference_and_reason() {
        let order_id = OrderId::generate();
        let m = StockMovement::order_out(
            ProductId::generate(),
            4,
            10,
            order_id,
            "PO-42",
            None,
            test_time(),
        );
        assert_eq!(m.new_stock, 6);
        assert_eq!(m.movement_type, MovementType::Out);
        assert_eq!(m.reason.as_deref(), Some("order PO-42"));
        assert!(m.references_order(order_id));
        assert!(!m.references_order(OrderId::generate()));
    }

    #[test]
    fn reservations_leave_on_hand_unchanged() {
        assert_eq!(MovementType::Reserved.apply(10, 3), 10);
        assert_eq!(MovementType::Released.apply(10, 3), 10);
        assert_eq!(MovementType::Adjustment.apply(10, -3), 7);
    }

    #[test]
    fn continuous_chain_verifies() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let ledger = vec![
            StockMovement::initial(a, 10, None, test_time()),
            out(b, 1, 5),
            out(a, 4, 10),
            out(a, 6, 6),
            out(b, 2, 4),
        ];
        assert_eq!(verify_chain(&ledger), Ok(()));
    }

    #[test]
    fn gap_between_movements_is_reported() {
        let a = ProductId::generate();
        let second = out(a, 1, 9);
        let ledger = vec![out(a, 4, 10), second.clone()];

        let err = verify_chain(&ledger).unwrap_err();
        assert_eq!(err.movement_id, second.id);
        assert_eq!(
            err.kind,
            ChainBreakKind::Discontinuity {
                expected_previous: 6,
                actual_previous: 9
            }
        );
    }

    #[test]
    fn bad_arithmetic_is_reported() {
        let mut m = out(ProductId::generate(), 4, 10);
        m.new_stock = 5;
        assert!(!m.is_arithmetically_consistent());

        let err = verify_chain(&[m]).unwrap_err();
        assert!(matches!(
            err.kind,
            ChainBreakKind::Arithmetic {
                expected_new: 6,
                actual_new: 5
            }
        ));
        assert!(err.to_string().contains("should be 6"));
    }

    #[test]
    fn wire_names_parse() {
        assert_eq!("out".parse::<MovementType>().unwrap(), MovementType::Out);
        assert_eq!("return".parse::<ReferenceType>().unwrap(), ReferenceType::Return);
        assert!("sideways".parse::<MovementType>().is_err());
    }
}
