use common::{device, ether, setup_env, Device, TestEnv};

use assert_matches::assert_matches;
use ethers_core::types::U256;
use openpass_sdk::advanced::calldata;
use openpass_sdk::basic::recovery::password_commitment;
use openpass_sdk::{Call, OperationOutcome, SdkError, Session, SmartAccount};
use openpass_state::recovery::DEFAULT_TIMELOCK_SECS;
use openpass_state::{RecoveryStatus, WalletRegistry};
use openpass_tests_integration::contract::WalletCall;

const PASSWORD: &str = "Correct-Horse-9";

struct Recovery {
    env: TestEnv,
    owner: Session,
    rescuer: Session,
    rescuer_device: Device,
}

/// A deployed, funded wallet with a recovery password, plus a session for a
/// second passkey bound to the same address.
async fn setup_recovery() -> Recovery {
    let env = setup_env();
    let owner_device = device();
    let (account, _) = env.create_account(&owner_device, "alice").await;
    env.mock.fund(account.address, ether(1));
    let owner = env.connect(account.clone(), &owner_device).await;

    owner
        .recovery()
        .set_recovery_password(PASSWORD, PASSWORD)
        .await
        .expect("password set");
    assert!(env.mock.is_deployed(account.address));

    let rescuer_device = device();
    let credential = rescuer_device.adapter.register("alice-new-phone").await.unwrap();
    let rescuer = env
        .connect(SmartAccount::bind(account.address, credential), &rescuer_device)
        .await;

    Recovery {
        env,
        owner,
        rescuer,
        rescuer_device,
    }
}

#[test_log::test(tokio::test)]
async fn test_full_recovery_cycle() -> anyhow::Result<()> {
    let Recovery {
        env,
        owner,
        rescuer,
        rescuer_device,
    } = setup_recovery().await;
    let address = owner.account().address;
    let recovery = rescuer.recovery().with_registry(env.store.as_ref());

    assert_eq!(recovery.check_status().await?.status, RecoveryStatus::None);
    recovery.initiate(PASSWORD).await?;

    let pending = recovery.check_status().await?;
    assert_eq!(pending.status, RecoveryStatus::Pending);
    assert_eq!(pending.initiation_time, env.mock.timestamp());
    assert_eq!(pending.completion_time, pending.initiation_time + DEFAULT_TIMELOCK_SECS);
    assert_eq!(pending.new_signer, Some(*rescuer.account().signer()));

    // one second short of the timelock
    env.mock.advance_time(DEFAULT_TIMELOCK_SECS - 1);
    let submitted = env.mock.submissions();
    assert_matches!(recovery.reclaim().await, Err(SdkError::RecoveryState(_)));
    assert_eq!(env.mock.submissions(), submitted);
    assert!(!recovery.check_status().await?.countdown(env.mock.timestamp()).is_complete());

    env.mock.advance_time(1);
    let ready = recovery.check_status().await?;
    assert_eq!(ready.status, RecoveryStatus::Ready);
    assert!(ready.countdown(env.mock.timestamp()).is_complete());

    recovery.reclaim().await?;
    assert_eq!(recovery.check_status().await?.status, RecoveryStatus::Reclaimed);
    assert_eq!(rescuer.signer_on_chain().await?, *rescuer.account().signer());

    // reclaimed is terminal for this cycle
    assert_matches!(recovery.cancel().await, Err(SdkError::RecoveryState(_)));
    assert_matches!(recovery.reclaim().await, Err(SdkError::RecoveryState(_)));

    // registry follows the new signer; the address never changes
    let wallet = env
        .store
        .find_by_address(address, env.network.chain_id)
        .await?
        .expect("wallet document");
    assert_eq!(wallet.signer(), *rescuer.account().signer());
    assert_eq!(wallet.address, address);

    // the new passkey logs into the same wallet
    let logged_in = openpass_sdk::AccountCreator::new(&rescuer_device.adapter, &env.network)
        .login(env.mock.as_ref())
        .await?;
    assert_eq!(logged_in.address, address);

    // and the old one can no longer sign for it
    let result = owner
        .engine()
        .send(&openpass_sdk::TransferRequest::native(
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            1u64.into(),
            ether(1),
        ))
        .await;
    assert_matches!(result, Err(SdkError::Submission(reason)) if reason.starts_with("AA24"));
    Ok(())
}

#[tokio::test]
async fn test_recovery_operations_call_the_wallet_directly() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;
    let new_key = *rescuer.account().signer();

    let initiated = rescuer.recovery().initiate(PASSWORD).await?;
    assert_matches!(
        env.mock.call_data(initiated.user_op_hash),
        Some(WalletCall::InitiateRecovery { new_key: key, .. }) if key == new_key
    );
    assert_matches!(
        rescuer.operation_outcome(initiated.user_op_hash).await?,
        OperationOutcome::Executed { .. }
    );

    let cancelled = owner.recovery().cancel().await?;
    assert_eq!(env.mock.call_data(cancelled.user_op_hash), Some(WalletCall::CancelRecovery));

    rescuer.recovery().initiate(PASSWORD).await?;
    env.mock.advance_time(DEFAULT_TIMELOCK_SECS);
    let reclaimed = rescuer.recovery().reclaim().await?;
    assert_eq!(env.mock.call_data(reclaimed.user_op_hash), Some(WalletCall::Reclaim));
    assert_eq!(rescuer.signer_on_chain().await?, new_key);
    Ok(())
}

#[tokio::test]
async fn test_self_call_through_execute_reaches_wallet() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;
    let address = owner.account().address;

    // the owner rotates the password with a plain execute(wallet, 0, ...)
    let rotated = "Battery-Staple-7";
    let calls = [Call::new(
        address,
        U256::zero(),
        calldata::set_recovery_password(password_commitment(address, rotated)),
    )];
    let engine = owner.engine();
    let quote = engine.estimate_and_quote(&calls).await?;
    let receipt = engine.submit(&calls, &quote).await?;
    assert_matches!(env.mock.call_data(receipt.user_op_hash), Some(WalletCall::Execute(_)));
    assert_matches!(
        owner.operation_outcome(receipt.user_op_hash).await?,
        OperationOutcome::Executed { .. }
    );

    // the old password no longer matches the stored commitment
    let stale = rescuer.recovery().initiate(PASSWORD).await?;
    assert_matches!(
        rescuer.operation_outcome(stale.user_op_hash).await?,
        OperationOutcome::Reverted { .. }
    );
    rescuer.recovery().initiate(rotated).await?;
    assert_eq!(
        rescuer.recovery().check_status().await?.status,
        RecoveryStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn test_owner_cancels_pending_recovery() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;

    rescuer.recovery().initiate(PASSWORD).await?;
    owner.recovery().cancel().await?;
    assert_eq!(
        owner.recovery().check_status().await?.status,
        RecoveryStatus::Cancelled
    );

    env.mock.advance_time(DEFAULT_TIMELOCK_SECS);
    assert_matches!(rescuer.recovery().reclaim().await, Err(SdkError::RecoveryState(_)));
    assert_eq!(owner.signer_on_chain().await?, *owner.account().signer());

    // a fresh cycle may start after a cancellation
    rescuer.recovery().initiate(PASSWORD).await?;
    assert_eq!(
        rescuer.recovery().check_status().await?.status,
        RecoveryStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn test_owner_cancels_ready_recovery() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;

    rescuer.recovery().initiate(PASSWORD).await?;
    env.mock.advance_time(DEFAULT_TIMELOCK_SECS);
    assert_eq!(owner.recovery().check_status().await?.status, RecoveryStatus::Ready);

    owner.recovery().cancel().await?;
    assert_eq!(
        owner.recovery().check_status().await?.status,
        RecoveryStatus::Cancelled
    );
    Ok(())
}

#[tokio::test]
async fn test_only_current_signer_may_cancel() -> anyhow::Result<()> {
    let Recovery { env, rescuer, .. } = setup_recovery().await;

    rescuer.recovery().initiate(PASSWORD).await?;
    let submitted = env.mock.submissions();
    assert_matches!(rescuer.recovery().cancel().await, Err(SdkError::RecoveryState(_)));
    assert_eq!(env.mock.submissions(), submitted);
    Ok(())
}

#[tokio::test]
async fn test_illegal_transitions_are_refused_before_signing() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;
    let submitted = env.mock.submissions();

    // nothing to cancel or reclaim yet
    assert_matches!(owner.recovery().cancel().await, Err(SdkError::RecoveryState(_)));
    assert_matches!(rescuer.recovery().reclaim().await, Err(SdkError::RecoveryState(_)));
    assert_eq!(env.mock.submissions(), submitted);

    rescuer.recovery().initiate(PASSWORD).await?;
    assert_matches!(
        rescuer.recovery().initiate(PASSWORD).await,
        Err(SdkError::RecoveryState(_))
    );
    Ok(())
}

#[tokio::test]
async fn test_only_pending_key_may_reclaim() -> anyhow::Result<()> {
    let Recovery { env, owner, rescuer, .. } = setup_recovery().await;

    rescuer.recovery().initiate(PASSWORD).await?;
    env.mock.advance_time(DEFAULT_TIMELOCK_SECS);
    let submitted = env.mock.submissions();
    assert_matches!(owner.recovery().reclaim().await, Err(SdkError::RecoveryState(_)));
    assert_eq!(env.mock.submissions(), submitted);
    assert_eq!(owner.signer_on_chain().await?, *owner.account().signer());
    Ok(())
}

#[tokio::test]
async fn test_wrong_password_reverts_on_chain() -> anyhow::Result<()> {
    let Recovery { env, rescuer, .. } = setup_recovery().await;

    let receipt = rescuer.recovery().initiate("Wrong-Horse-99").await?;
    assert_matches!(
        rescuer.operation_outcome(receipt.user_op_hash).await?,
        OperationOutcome::Reverted { reason } if reason.contains("password")
    );
    assert_eq!(
        rescuer.recovery().check_status().await?.status,
        RecoveryStatus::None
    );
    assert!(env.mock.receipt(receipt.user_op_hash).is_some());
    Ok(())
}

#[tokio::test]
async fn test_weak_or_mismatched_password_is_not_submitted() {
    let env = setup_env();
    let owner_device = device();
    let (account, _) = env.create_account(&owner_device, "alice").await;
    env.mock.fund(account.address, ether(1));
    let owner = env.connect(account, &owner_device).await;

    assert_matches!(
        owner.recovery().set_recovery_password("password", "password").await,
        Err(SdkError::RecoveryState(_))
    );
    assert_matches!(
        owner.recovery().set_recovery_password(PASSWORD, "Correct-Horse-8").await,
        Err(SdkError::RecoveryState(_))
    );
    assert_eq!(env.mock.submissions(), 0);
    assert_eq!(env.mock.nonce_of(owner.account().address), U256::zero());
}
