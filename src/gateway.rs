//! Balance gateway: merges native-coin and token balances for one account

use crate::chain::{ChainClient, TokenReader};
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Both balances of one account, as decimal strings of minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub native_balance: String,
    pub token_balance: String,
}

/// Stateless façade over the two balance sources. Cloning is cheap and every
/// call re-resolves both sides.
#[derive(Clone)]
pub struct BalanceGateway {
    native: Arc<dyn ChainClient>,
    token: Arc<dyn TokenReader>,
}

impl BalanceGateway {
    pub fn new(native: Arc<dyn ChainClient>, token: Arc<dyn TokenReader>) -> Self {
        Self { native, token }
    }

    /// Runs both lookups concurrently. The first failure aborts the other
    /// lookup and is reported with the side it came from; there is no partial
    /// result.
    pub async fn get_balances(
        &self,
        account: &str,
        cancel: &CancellationToken,
    ) -> Result<BalanceView, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let native = async {
            self.native
                .native_balance(account)
                .await
                .map_err(GatewayError::NativeBalance)
        };
        let token = async {
            self.token
                .token_balance(account)
                .await
                .map_err(GatewayError::TokenBalance)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            joined = async { tokio::try_join!(native, token) } => {
                let (native_balance, token_balance) = joined?;
                Ok(BalanceView { native_balance, token_balance })
            }
        }
    }
}
