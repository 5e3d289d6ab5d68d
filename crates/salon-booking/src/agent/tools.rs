//! The booking actions the chat model may call.
//!
//! Every call returns text for the model to read: JSON for listings, a sentence for
//! confirmations, and a sentence describing the problem when something fails. Tool
//! failures never abort a chat turn.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::llm_client::ToolDefinition;
use crate::booking_db::schema::{format_date, format_time};
use crate::booking_db::{parse_date, BookingDatabase, NewAppointment};
use crate::error::BookingError;
use crate::metrics;
use crate::scheduling::OperatingHours;
use crate::utils::TextUtils;

const SEARCH_RESULT_LIMIT: usize = 3;
const SNIPPET_CHARS: usize = 500;

/// Accept `7`, `7.0`, `"7"` or `"#7"` for an id; models are not consistent about it.
fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Float(id) if id.fract() == 0.0 => Ok(id as i64),
        RawId::Float(id) => Err(de::Error::custom(format!("{} is not a whole number", id))),
        RawId::Text(text) => text
            .trim()
            .trim_start_matches('#')
            .parse()
            .map_err(|_| de::Error::custom(format!("'{}' is not a numeric id", text))),
    }
}

#[derive(Debug, Deserialize)]
struct DateArgs {
    date: String,
}

#[derive(Debug, Deserialize)]
struct BookArgs {
    name: String,
    phone: String,
    #[serde(deserialize_with = "flexible_id")]
    service_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    slot_id: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhoneArgs {
    phone: String,
}

#[derive(Debug, Deserialize)]
struct CancelArgs {
    #[serde(deserialize_with = "flexible_id")]
    appointment_id: i64,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &str) -> Result<T, String> {
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|e| format!("Invalid arguments for {}: {}", tool, e))
}

pub struct BookingTools {
    database: Arc<BookingDatabase>,
    hours: OperatingHours,
}

impl BookingTools {
    pub fn new(database: Arc<BookingDatabase>, hours: OperatingHours) -> Self {
        Self { database, hours }
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "list_services",
                description: "List all nail services the salon offers with their duration and price.",
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            },
            ToolDefinition {
                name: "list_available_slots",
                description: "List the open time slots for a date. Use it before booking.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "date": {"type": "string", "description": "Date in YYYY-MM-DD format"}
                    },
                    "required": ["date"]
                }),
            },
            ToolDefinition {
                name: "book",
                description: "Book an appointment once the customer's name, phone, service and time slot are known.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Customer full name"},
                        "phone": {"type": "string", "description": "Customer phone number"},
                        "service_id": {"type": "integer", "description": "Id from list_services"},
                        "slot_id": {"type": "integer", "description": "Id from list_available_slots"},
                        "email": {"type": "string", "description": "Customer email, optional"},
                        "notes": {"type": "string", "description": "Special requests, optional"}
                    },
                    "required": ["name", "phone", "service_id", "slot_id"]
                }),
            },
            ToolDefinition {
                name: "list_appointments_by_phone",
                description: "Look up a customer's upcoming and past appointments by phone number.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "phone": {"type": "string", "description": "Customer phone number"}
                    },
                    "required": ["phone"]
                }),
            },
            ToolDefinition {
                name: "cancel",
                description: "Cancel an appointment by its id.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "appointment_id": {"type": "integer", "description": "Appointment id"}
                    },
                    "required": ["appointment_id"]
                }),
            },
            ToolDefinition {
                name: "search_knowledge",
                description: "Search the salon's knowledge base for policies, aftercare and other information.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Keywords to look for"}
                    },
                    "required": ["query"]
                }),
            },
        ]
    }

    /// Run one tool call. Unknown tools and bad arguments are reported as text.
    pub fn invoke(&self, name: &str, arguments: &str) -> String {
        debug!("Tool call {} with {}", name, arguments);
        let result = match name {
            "list_services" => Ok(self.list_services()),
            "list_available_slots" => {
                parse_args::<DateArgs>(name, arguments).map(|args| self.list_available_slots(&args.date))
            }
            "book" => parse_args::<BookArgs>(name, arguments).map(|args| self.book(args)),
            "list_appointments_by_phone" => parse_args::<PhoneArgs>(name, arguments)
                .map(|args| self.list_appointments_by_phone(&args.phone)),
            "cancel" => parse_args::<CancelArgs>(name, arguments).map(|args| self.cancel(args.appointment_id)),
            "search_knowledge" => {
                parse_args::<SearchArgs>(name, arguments).map(|args| self.search_knowledge(&args.query))
            }
            other => Err(format!("Unknown tool: {}", other)),
        };
        result.unwrap_or_else(|message| {
            warn!("{}", message);
            message
        })
    }

    fn list_services(&self) -> String {
        match self.database.services.list(false) {
            Ok(services) => {
                let rows: Vec<_> = services
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "name": s.name,
                            "description": s.description,
                            "duration_minutes": s.duration_minutes,
                            "price": s.price,
                        })
                    })
                    .collect();
                serde_json::Value::Array(rows).to_string()
            }
            Err(e) => format!("Error listing services: {}", e),
        }
    }

    fn list_available_slots(&self, date: &str) -> String {
        let date = match parse_date(date) {
            Ok(date) => date,
            Err(_) => return "Invalid date format. Please use YYYY-MM-DD format.".to_string(),
        };
        match self.database.slots.ensure_available(date, &self.hours) {
            Ok(slots) => {
                let rows: Vec<_> = slots
                    .iter()
                    .map(|slot| {
                        json!({
                            "id": slot.id,
                            "date": format_date(slot.date),
                            "start_time": format_time(slot.start_time),
                            "end_time": format_time(slot.end_time),
                        })
                    })
                    .collect();
                serde_json::Value::Array(rows).to_string()
            }
            Err(e) => format!("Error listing time slots: {}", e),
        }
    }

    fn book(&self, args: BookArgs) -> String {
        let outcome = self.database.appointments.book(NewAppointment {
            customer_name: args.name,
            customer_phone: args.phone,
            customer_email: args.email,
            service_id: args.service_id,
            time_slot_id: args.slot_id,
            notes: args.notes,
        });
        match outcome {
            Ok(detail) => {
                metrics::record_booking("booked");
                format!(
                    "Appointment booked successfully! Appointment ID: #{}. Service: {} on {} from {} to {}.",
                    detail.appointment.id,
                    detail.service.name,
                    format_date(detail.time_slot.date),
                    format_time(detail.time_slot.start_time),
                    format_time(detail.time_slot.end_time),
                )
            }
            Err(e) => {
                metrics::record_booking(e.outcome_label());
                match e {
                    BookingError::NotFound(_)
                    | BookingError::Conflict(_)
                    | BookingError::InvalidArgument(_) => e.to_string(),
                    other => format!("Error booking appointment: {}", other),
                }
            }
        }
    }

    fn list_appointments_by_phone(&self, phone: &str) -> String {
        match self.database.appointments.list_by_phone(phone) {
            Ok(appointments) if appointments.is_empty() => {
                "No appointments found for this phone number.".to_string()
            }
            Ok(appointments) => {
                let rows: Vec<_> = appointments
                    .iter()
                    .map(|detail| {
                        json!({
                            "id": detail.appointment.id,
                            "service": detail.service.name,
                            "date": format_date(detail.time_slot.date),
                            "start_time": format_time(detail.time_slot.start_time),
                            "end_time": format_time(detail.time_slot.end_time),
                            "status": detail.appointment.status,
                        })
                    })
                    .collect();
                serde_json::Value::Array(rows).to_string()
            }
            Err(e) => format!("Error looking up appointments: {}", e),
        }
    }

    fn cancel(&self, appointment_id: i64) -> String {
        match self.database.appointments.cancel(appointment_id) {
            Ok(_) => format!("Appointment {} has been cancelled successfully.", appointment_id),
            Err(BookingError::NotFound(_)) => {
                format!("Appointment with ID {} not found.", appointment_id)
            }
            Err(e) => format!("Error cancelling appointment: {}", e),
        }
    }

    fn search_knowledge(&self, query: &str) -> String {
        if query.trim().is_empty() {
            return "Please provide something to search for.".to_string();
        }
        match self.database.documents.search_chunks(query, SEARCH_RESULT_LIMIT) {
            Ok(matches) if matches.is_empty() => "I couldn't find related information in the knowledge base. \
                 I can help with our nail services, booking an appointment, or checking your appointments."
                .to_string(),
            Ok(matches) => {
                let mut text = String::from("Based on the knowledge base:\n\n");
                for (i, hit) in matches.iter().enumerate() {
                    text.push_str(&format!(
                        "{}. From document '{}':\n{}\n\n",
                        i + 1,
                        hit.document_title,
                        TextUtils::truncate_with_ellipsis(&hit.content, SNIPPET_CHARS)
                    ));
                }
                text.trim_end().to_string()
            }
            Err(e) => format!("Error searching the knowledge base: {}", e),
        }
    }
}
