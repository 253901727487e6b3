//! 数据库实体。与schema中的表一一对应。
use super::schema::*;
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = guest_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GuestSession {
    pub id: i32,
    pub guest_id: String,
    pub credits: i32,
    pub history: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = guest_sessions)]
pub struct NewGuestSession<'a> {
    pub guest_id: &'a str,
    pub credits: i32,
    pub history: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub email: String,
    pub role: String,
    pub current_credits: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub role: &'a str,
    pub current_credits: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = generation_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryRow {
    pub id: i32,
    pub history_id: String,
    pub user_email: Option<String>,
    pub guest_id: Option<String>,
    pub tool_key: String,
    pub input_prompt: String,
    pub output_images: String,
    pub share: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = generation_history)]
pub struct NewHistoryRow<'a> {
    pub history_id: &'a str,
    pub user_email: Option<&'a str>,
    pub guest_id: Option<&'a str>,
    pub tool_key: &'a str,
    pub input_prompt: &'a str,
    pub output_images: &'a str,
    pub share: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = payment_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PaymentTransaction {
    pub id: i32,
    pub order_id: String,
    pub user_email: String,
    pub status: String,
    pub amount: f64,
    pub credits: i32,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = payment_transactions)]
pub struct NewPaymentTransaction<'a> {
    pub order_id: &'a str,
    pub user_email: &'a str,
    pub status: &'a str,
    pub amount: f64,
    pub credits: i32,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = usage_counters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UsageCounter {
    pub id: i32,
    pub tier: String,
    pub used: i32,
    pub updated_at: NaiveDateTime,
}
