//! Well-known addresses used to classify LP token holders.

/// Dead addresses. LP tokens sent here are gone forever.
pub const BURN_ADDRESSES: &[&str] = &[
    "1111111111111111111111111111111111111111111",
    "1nc1nerator11111111111111111111111111111111",
];

/// The AMM's own authority. Initial LP parked here cannot be withdrawn.
pub const AMM_LP_AUTHORITY: &str = "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1";

/// Time-lock / vesting programs. LP owned by their PDAs is contract-locked.
pub const LOCKER_PROGRAMS: &[&str] = &[
    "strmRqUCoQUgGUan5YhzUZa6KqdzwX5L6FpUxfmKg5m",
    "LocpQgucEQHbqNABEYvBMrzJKjWcjEPPwd6i215cQ9a",
    "2r5VekMNiWPzi1pWwvJczrdPaZnJG59u91unSrTunwJg",
    "FLockTopXvM3MRs5ThJTsSQDQNmzWfnj5s7xUQXKTc1v",
    "GJa1VEhNhjMEJoeqYyPvH5Ts9XadZAdFmRSi8ijrSU7G",
];

/// The System Program: owner of regular wallets and of closed accounts.
pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";

/// The constant-product AMM program the execution backend supports.
pub const AMM_V4_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

pub fn is_burn_address(address: &str) -> bool {
    BURN_ADDRESSES.contains(&address)
}

pub fn is_locker_program(address: &str) -> bool {
    LOCKER_PROGRAMS.contains(&address)
}
