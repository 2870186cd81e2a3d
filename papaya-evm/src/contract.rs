//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface needed for checkout:
//! - [`IERC20`] - balance, allowance and approval of the payment token
//! - [`IPapaya`] - the custody contract holding deposits and subscriptions

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 interface.
    ///
    /// `approve` is declared with its standard `bool` return, but callers
    /// never decode it: some deployed stablecoins return nothing.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

sol! {
    /// Papaya custody contract.
    ///
    /// Balances are 18-decimal regardless of the token. `deposit` takes the
    /// amount in token decimals; the `isPermit2` flag is always false here,
    /// deposits pull through a plain ERC-20 allowance.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IPapaya {
        function balanceOf(address account) external view returns (uint256);
        function deposit(uint256 amount, bool isPermit2) external;
        function subscribe(address author, uint96 subscriptionRate, uint256 projectId) external;
        function multicall(bytes[] data) external returns (bytes[] results);
    }
}
