//! The declared tyre-management tables.
//!
//! Two sets exist. [`startup`] is what every process instance ensures at
//! boot: the tables the request workflow cannot run without. [`full`] adds
//! the provisioning tables that the hosted-deployment initializer also
//! creates (`suppliers`, `requestimages`, `tiredetails`).
//!
//! The surface is deliberately warty: `supplier` and `suppliers` are both
//! real tables, as are `request_images` and `requestimages`, and several
//! column names are mixed-case (`vehicleNumber`, `CostCenter`). The live
//! production database has all of them, so they are reproduced here
//! verbatim rather than unified.

use crate::schema::SqlType::{Boolean, Date, Integer, Text, Timestamp};
use crate::schema::{Column, OnDelete, Schema, SqlType, Table};

/// Every status a tyre-replacement request can be in, in workflow order:
/// each approver role appends its own approved/rejected pair, then the
/// order-handling states follow.
pub const REQUEST_STATUS: &[&str] = &[
    "pending",
    "supervisor approved",
    "technical-manager approved",
    "engineer approved",
    "customer-officer approved",
    "approved",
    "rejected",
    "supervisor rejected",
    "technical-manager rejected",
    "engineer rejected",
    "customer-officer rejected",
    "complete",
    "order placed",
    "order cancelled",
];

/// The tables ensured on every process start.
pub fn startup() -> Schema {
    Schema {
        tables: vec![
            users(),
            vehicles(),
            supplier(),
            requests(),
            request_images(),
            requestbackup(),
            request_images_backup(),
        ],
    }
}

/// [`startup`] plus the provisioning tables.
pub fn full() -> Schema {
    let mut schema = startup();
    schema
        .tables
        .extend([suppliers(), requestimages(), tiredetails()]);
    schema
}

fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("azure_id", SqlType::VarChar(100)).not_null().unique())
        .column(Column::new("email", SqlType::VarChar(255)).not_null().unique())
        .column(Column::new("name", SqlType::VarChar(255)))
        .column(Column::new("role", SqlType::VarChar(50)))
        .column(Column::new("costCentre", SqlType::VarChar(100)))
        .column(Column::new("department", SqlType::VarChar(100)))
        .index(&["azure_id"])
        .index(&["email"])
        .index(&["role"])
}

fn vehicles() -> Table {
    Table::new("vehicles")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("registeredBy", Integer).not_null())
        .column(Column::new("vehicleNumber", SqlType::VarChar(50)).not_null().unique())
        .column(Column::new("make", SqlType::VarChar(50)))
        .column(Column::new("model", SqlType::VarChar(50)))
        .column(Column::new("type", SqlType::VarChar(50)))
        .column(Column::new("status", SqlType::VarChar(20)))
        .column(Column::new("cost_centre", SqlType::VarChar(100)))
        .column(Column::new("department", SqlType::VarChar(100)))
        .index(&["vehicleNumber"])
        .index(&["registeredBy"])
        .foreign_key("registeredBy", "users", "id", OnDelete::NoAction)
}

fn supplier() -> Table {
    Table::new("supplier")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("name", SqlType::VarChar(100)).not_null())
        .column(Column::new("email", SqlType::VarChar(50)).not_null())
        .column(Column::new("phone", SqlType::VarChar(20)).not_null())
        .column(Column::new("address", Text))
        .column(Column::new("formsfree_key", SqlType::VarChar(100)).not_null())
        .index(&["email"])
        .index(&["name"])
}

/// Columns shared by `requests` and its soft-delete backup.
fn request_columns() -> Vec<Column> {
    vec![
        Column::new("id", Integer).primary_key().identity(),
        Column::new("userId", Integer).not_null(),
        Column::new("vehicleId", Integer).not_null(),
        Column::new("vehicleNumber", SqlType::VarChar(50)).not_null(),
        Column::new("quantity", Integer).not_null(),
        Column::new("tubesQuantity", Integer).not_null(),
        Column::new("tireSize", SqlType::VarChar(50)).not_null(),
        Column::new("requestReason", Text).not_null(),
        Column::new("requesterName", SqlType::VarChar(100)).not_null(),
        Column::new("requesterEmail", SqlType::VarChar(100)).not_null(),
        Column::new("requesterPhone", SqlType::VarChar(20)).not_null(),
        Column::new("vehicleBrand", SqlType::VarChar(50)).not_null(),
        Column::new("vehicleModel", SqlType::VarChar(50)).not_null(),
        Column::new("lastReplacementDate", Date).not_null(),
        Column::new("existingTireMake", SqlType::VarChar(100)).not_null(),
        Column::new("tireSizeRequired", SqlType::VarChar(50)).not_null(),
        Column::new("presentKmReading", Integer).not_null(),
        Column::new("previousKmReading", Integer).not_null(),
        Column::new("tireWearPattern", SqlType::VarChar(100)).not_null(),
        Column::new("comments", Text),
        Column::new("status", SqlType::Enum(REQUEST_STATUS)).default_expr("'pending'"),
        Column::new("submittedAt", Timestamp).not_null(),
        Column::new("supervisor_notes", Text),
        Column::new("technical_manager_note", Text),
        Column::new("engineer_note", Text),
        Column::new("customer_officer_note", Text),
        Column::new("supervisorId", Integer).not_null(),
        Column::new("technical_manager_id", Integer),
        Column::new("supervisor_decision_by", Integer),
        Column::new("engineer_decision_by", Integer),
        Column::new("customer_officer_decision_by", Integer),
        Column::new("deliveryOfficeName", SqlType::VarChar(100)),
        Column::new("deliveryStreetName", SqlType::VarChar(255)),
        Column::new("deliveryTown", SqlType::VarChar(100)),
        Column::new("totalPrice", SqlType::Decimal { precision: 10, scale: 2 }),
        Column::new("warrantyDistance", Integer),
        Column::new("tireWearIndicatorAppeared", Boolean).default_expr("false"),
        Column::new("Department", SqlType::VarChar(100)),
        Column::new("CostCenter", SqlType::VarChar(100)),
        Column::new("supplierName", SqlType::VarChar(255)),
        Column::new("supplierEmail", SqlType::VarChar(255)),
        Column::new("supplierPhone", SqlType::VarChar(255)),
        Column::new("orderNumber", SqlType::VarChar(255)),
        Column::new("orderNotes", Text),
        Column::new("orderPlacedDate", Timestamp),
    ]
}

fn requests() -> Table {
    Table::new("requests")
        .columns(request_columns())
        .index(&["userId"])
        .index(&["vehicleId"])
        .index(&["vehicleNumber"])
        .index(&["status"])
        .index(&["submittedAt"])
        .index(&["supervisorId"])
        .foreign_key("userId", "users", "id", OnDelete::NoAction)
        .foreign_key("vehicleId", "vehicles", "id", OnDelete::NoAction)
        .foreign_key("supervisorId", "users", "id", OnDelete::NoAction)
        .foreign_key("technical_manager_id", "users", "id", OnDelete::NoAction)
        .foreign_key("supervisor_decision_by", "users", "id", OnDelete::NoAction)
        .foreign_key("engineer_decision_by", "users", "id", OnDelete::NoAction)
        .foreign_key("customer_officer_decision_by", "users", "id", OnDelete::NoAction)
}

fn request_images() -> Table {
    Table::new("request_images")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("requestId", Integer).not_null())
        .column(Column::new("imagePath", Text).not_null())
        .column(Column::new("imageIndex", Integer).not_null())
        .index(&["requestId"])
        .index(&["imageIndex"])
        .foreign_key("requestId", "requests", "id", OnDelete::Cascade)
}

/// Soft-deleted requests. Rows keep the original request id, so the id is a
/// plain primary key, and there are no foreign keys: a backup must outlive
/// the user, vehicle, and request it refers to.
fn requestbackup() -> Table {
    let mut columns = request_columns();
    columns[0].identity = false;
    columns.extend([
        Column::new("deletedAt", Timestamp).not_null().default_expr("now()"),
        Column::new("deletedBy", Integer),
        Column::new("deletedByRole", SqlType::VarChar(50)),
    ]);
    Table::new("requestbackup")
        .columns(columns)
        .index(&["deletedAt"])
        .index(&["id"])
        .index(&["vehicleNumber"])
        .index(&["userId"])
}

fn request_images_backup() -> Table {
    Table::new("request_images_backup")
        .column(Column::new("id", Integer).primary_key())
        .column(Column::new("requestId", Integer).not_null())
        .column(Column::new("imagePath", Text).not_null())
        .column(Column::new("imageIndex", Integer).not_null())
        .column(Column::new("deletedAt", Timestamp).not_null().default_expr("now()"))
        .index(&["requestId"])
        .index(&["deletedAt"])
}

fn suppliers() -> Table {
    Table::new("suppliers")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("name", SqlType::VarChar(255)).not_null())
        .column(Column::new("email", SqlType::VarChar(255)))
        .column(Column::new("phone", SqlType::VarChar(255)))
        .column(Column::new("address", Text))
        .column(Column::new("createdAt", Timestamp).default_expr("now()"))
        .column(Column::new("updatedAt", Timestamp).default_expr("now()"))
        .index(&["name"])
        .index(&["email"])
}

fn requestimages() -> Table {
    Table::new("requestimages")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("requestId", Integer).not_null())
        .column(Column::new("imageUrl", SqlType::VarChar(500)).not_null())
        .column(Column::new("uploadedAt", Timestamp).default_expr("now()"))
        .index(&["requestId"])
        .foreign_key("requestId", "requests", "id", OnDelete::Cascade)
}

fn tiredetails() -> Table {
    Table::new("tiredetails")
        .column(Column::new("id", Integer).primary_key().identity())
        .column(Column::new("requestId", Integer).not_null())
        .column(Column::new("tireSize", SqlType::VarChar(50)).not_null())
        .column(Column::new("tireBrand", SqlType::VarChar(100)))
        .column(Column::new("tireModel", SqlType::VarChar(100)))
        .column(Column::new("quantity", Integer).not_null())
        .column(Column::new("unitPrice", SqlType::Decimal { precision: 10, scale: 2 }))
        .column(Column::new("totalPrice", SqlType::Decimal { precision: 10, scale: 2 }))
        .index(&["requestId"])
        .foreign_key("requestId", "requests", "id", OnDelete::Cascade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::dependency_order;

    #[test]
    fn startup_declares_seven_tables() {
        let schema = startup();
        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "users",
                "vehicles",
                "supplier",
                "requests",
                "request_images",
                "requestbackup",
                "request_images_backup",
            ]
        );
    }

    #[test]
    fn full_adds_the_provisioning_tables() {
        let schema = full();
        assert_eq!(schema.tables.len(), 10);
        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"suppliers"));
        assert!(names.contains(&"requestimages"));
        assert!(names.contains(&"tiredetails"));
    }

    #[test]
    fn request_status_has_all_workflow_values() {
        assert_eq!(REQUEST_STATUS.len(), 14);
        assert_eq!(REQUEST_STATUS[0], "pending");
        assert!(REQUEST_STATUS.contains(&"technical-manager approved"));
        assert!(REQUEST_STATUS.contains(&"order cancelled"));
    }

    #[test]
    fn requests_and_backup_share_the_request_columns() {
        let schema = startup();
        let requests = schema.tables.iter().find(|t| t.name == "requests").unwrap();
        let backup = schema.tables.iter().find(|t| t.name == "requestbackup").unwrap();

        assert_eq!(requests.columns.len(), 45);
        assert_eq!(backup.columns.len(), 48);

        // Backup ids are copied from the source request, never generated.
        assert!(requests.columns[0].identity);
        assert!(!backup.columns[0].identity);
        assert!(backup.foreign_keys.is_empty());
    }

    #[test]
    fn every_foreign_key_references_a_declared_table() {
        // dependency_order rejects unknown references, so Ok means closed.
        assert!(dependency_order(&startup()).is_ok());
        assert!(dependency_order(&full()).is_ok());
    }
}
