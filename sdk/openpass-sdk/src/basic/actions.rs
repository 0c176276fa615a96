use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::to_checksum;
use openpass_state::FeeQuote;
use tracing::info;

use crate::advanced::calldata;
use crate::basic::session::Session;
use crate::core::constants::NATIVE_ASSET;
use crate::error::{Result, SdkError};
use crate::types::{Call, SubmissionReceipt};

/// Native-value call when `asset` is the zero-address sentinel, otherwise an
/// ERC-20 `transfer` on the token contract.
pub fn build_call(asset: Address, recipient: Address, amount: U256) -> Call {
    if asset == NATIVE_ASSET {
        Call::value(recipient, amount)
    } else {
        Call::new(asset, U256::zero(), calldata::erc20_transfer(recipient, amount))
    }
}

/// Parse and validate a user-supplied destination address.
///
/// Requires a `0x` prefix and 40 hex digits; mixed-case input must carry a
/// valid EIP-55 checksum. The zero address is refused.
pub fn validate_recipient(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| SdkError::InvalidRecipient(format!("{trimmed}: missing 0x prefix")))?;

    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SdkError::InvalidRecipient(format!("{trimmed}: expected 40 hex digits")));
    }

    let address: Address = trimmed
        .parse()
        .map_err(|_| SdkError::InvalidRecipient(trimmed.to_string()))?;

    let mixed_case = digits.chars().any(|c| c.is_ascii_lowercase())
        && digits.chars().any(|c| c.is_ascii_uppercase());
    if mixed_case && to_checksum(&address, None) != trimmed {
        return Err(SdkError::InvalidRecipient(format!("{trimmed}: bad checksum")));
    }

    if address.is_zero() {
        return Err(SdkError::InvalidRecipient("zero address".into()));
    }
    Ok(address)
}

/// A user-facing transfer.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Token address, or [`NATIVE_ASSET`]
    pub asset: Address,
    /// Destination as typed by the user
    pub recipient: String,
    pub amount: U256,
    /// Known balance of `asset` held by the account
    pub balance: U256,
}

impl TransferRequest {
    pub fn native(recipient: impl Into<String>, amount: U256, balance: U256) -> Self {
        Self {
            asset: NATIVE_ASSET,
            recipient: recipient.into(),
            amount,
            balance,
        }
    }

    pub fn token(asset: Address, recipient: impl Into<String>, amount: U256, balance: U256) -> Self {
        Self {
            asset,
            recipient: recipient.into(),
            amount,
            balance,
        }
    }

    pub fn is_native(&self) -> bool {
        self.asset == NATIVE_ASSET
    }
}

/// Builds, prices, signs and submits operations for a session.
pub struct TransactionEngine<'a> {
    session: &'a Session,
}

impl<'a> TransactionEngine<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Gas estimation and fee lookup, run concurrently
    pub async fn estimate_and_quote(&self, calls: &[Call]) -> Result<FeeQuote> {
        self.quote_call_data(calldata::encode_calls(calls)?).await
    }

    pub async fn quote_call_data(&self, call_data: Bytes) -> Result<FeeQuote> {
        let (limits, fee) = tokio::try_join!(
            self.session.estimate_call_data(call_data),
            self.session.current_fee_market()
        )?;
        Ok(FeeQuote::new(limits, fee))
    }

    /// Sign and broadcast `calls` priced by `quote`. Submitted exactly once.
    pub async fn submit(&self, calls: &[Call], quote: &FeeQuote) -> Result<SubmissionReceipt> {
        self.submit_call_data(calldata::encode_calls(calls)?, quote).await
    }

    /// Like [`Self::submit`] but with the operation callData given verbatim.
    pub async fn submit_call_data(
        &self,
        call_data: Bytes,
        quote: &FeeQuote,
    ) -> Result<SubmissionReceipt> {
        let op = self
            .session
            .build_operation(call_data)
            .await?
            .with_gas_limits(&quote.limits)
            .with_fee(&quote.fee);

        let signed = self.session.sign_user_operation(op).await?;
        let user_op_hash = self.session.send_user_operation(&signed).await?;

        info!(
            sender = %self.session.account().address,
            nonce = %signed.nonce,
            user_op_hash = ?user_op_hash,
            "user operation submitted"
        );
        Ok(SubmissionReceipt { user_op_hash })
    }

    /// Validate, quote and submit a transfer.
    ///
    /// Recipient and amount are checked before any network call; the fee is
    /// checked before signing: against the supplied balance together with the
    /// amount for native transfers, against the account's on-chain native
    /// balance for token transfers.
    pub async fn send(&self, request: &TransferRequest) -> Result<SubmissionReceipt> {
        let recipient = validate_recipient(&request.recipient)?;
        if request.amount > request.balance {
            return Err(SdkError::InsufficientBalance {
                required: request.amount,
                available: request.balance,
            });
        }

        let calls = [build_call(request.asset, recipient, request.amount)];
        let quote = self.estimate_and_quote(&calls).await?;

        if request.is_native() {
            let required = request
                .amount
                .checked_add(quote.total_fee()?)
                .ok_or(openpass_state::StateError::FeeOverflow)?;
            if required > request.balance {
                return Err(SdkError::InsufficientBalance {
                    required,
                    available: request.balance,
                });
            }
        } else {
            let fee = quote.total_fee()?;
            let native = self.session.native_balance().await?;
            if fee > native {
                return Err(SdkError::InsufficientBalance {
                    required: fee,
                    available: native,
                });
            }
        }

        self.submit(&calls, &quote).await
    }
}

impl Session {
    pub fn engine(&self) -> TransactionEngine<'_> {
        TransactionEngine::new(self)
    }
}
