pub mod plaid;
pub mod types;

#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// One sync call for the linked item. Returns the response document verbatim.
    async fn fetch_transactions(&self) -> anyhow::Result<serde_json::Value>;
}
