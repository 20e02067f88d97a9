// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Sensor command codes
//!
//! Codes are 16-bit values partitioned by function, transmitted as
//! `CMD_HI` / `CMD_LO` bytes in the inner frame block.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// Sensor commands
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Debug,
    IntoPrimitive,
    TryFromPrimitive,
    Display,
    EnumString,
    EnumVariantNames,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum Command {
    /// Start enrollment of a finger slot
    Register = 0xA000,

    /// Delete a single finger slot
    DeleteSingle = 0xA400,

    /// Delete all registered fingers
    DeleteAll = 0xA401,

    /// Fetch the number of registered fingers
    GetRegNum = 0xA500,

    /// Match a presented finger against registered templates
    Recognize = 0xA7FF,

    /// Fetch sensor chip identifier
    GetChipId = 0xB100,

    /// Reset the sensor
    SysReset = 0xB200,

    /// Fetch sensor unique identifier
    GetUid = 0xB400,

    /// Fetch firmware version
    GetVer = 0xB500,

    /// Cancel the current sensor operation
    CancelExecute = 0xB600,

    /// Reset sensor parameters
    ParamReset = 0xC000,

    /// Fetch sensor binding state
    GetInitState = 0xC200,

    /// Provision the communication key
    SetAesKey = 0xD000,

    /// Query whether a communication key is provisioned
    GetAesKeyState = 0xD100,

    /// Fetch a sensor challenge for the next encrypted frame
    GetRandomNum = 0xD200,

    /// Run the sensor self test
    SysTest = 0xD300,

    /// Enter low power mode
    LowPower = 0xD400,
}

impl Command {
    /// Fetch the 16-bit command code
    pub fn code(&self) -> u16 {
        (*self).into()
    }

    /// Split command code into `(CMD_HI, CMD_LO)`
    pub fn to_bytes(&self) -> [u8; 2] {
        self.code().to_be_bytes()
    }

    /// Whether frames for this command are AES protected
    pub fn encrypted(&self) -> bool {
        !matches!(
            self,
            Command::GetVer
                | Command::GetRandomNum
                | Command::SetAesKey
                | Command::GetAesKeyState
                | Command::SysTest
        )
    }

    /// Whether completion depends on the user presenting a finger
    pub fn user_paced(&self) -> bool {
        matches!(self, Command::Register | Command::Recognize)
    }
}
