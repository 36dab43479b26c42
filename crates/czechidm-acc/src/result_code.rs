// Result codes of the provisioning module

use czechidm_common::ResultCode;

pub const MODULE_ACC: &str = "acc";

pub const PROVISIONING_SUCCEED: ResultCode = ResultCode {
    code: "PROVISIONING_SUCCEED",
    module: MODULE_ACC,
    status: 200,
    message: "Provisioning operation [{operationType}] for entity [{entity}] on system [{system}] succeeded.",
};

pub const PROVISIONING_FAILED: ResultCode = ResultCode {
    code: "PROVISIONING_FAILED",
    module: MODULE_ACC,
    status: 400,
    message: "Provisioning operation [{operationType}] for entity [{entity}] on system [{system}] failed: {cause}",
};

pub const PROVISIONING_SYSTEM_DISABLED: ResultCode = ResultCode {
    code: "PROVISIONING_SYSTEM_DISABLED",
    module: MODULE_ACC,
    status: 400,
    message: "Provisioning operation for entity [{entity}] is not executed. System [{system}] is disabled.",
};

pub const PROVISIONING_SYSTEM_BLOCKED: ResultCode = ResultCode {
    code: "PROVISIONING_SYSTEM_BLOCKED",
    module: MODULE_ACC,
    status: 400,
    message: "Provisioning operation [{operationType}] for entity [{entity}] is blocked on system [{system}].",
};

pub const PROVISIONING_IS_IN_QUEUE: ResultCode = ResultCode {
    code: "PROVISIONING_IS_IN_QUEUE",
    module: MODULE_ACC,
    status: 400,
    message: "Provisioning operation for entity [{entity}] on system [{system}] waits in queue behind [{count}] older operations.",
};

pub const PROVISIONING_BREAK_OPERATION_EXISTS: ResultCode = ResultCode {
    code: "PROVISIONING_BREAK_OPERATION_EXISTS",
    module: MODULE_ACC,
    status: 409,
    message: "Provisioning break for operation [{operationType}] on system [{system}] already exists.",
};

pub const PROVISIONING_BREAK_RECIPIENT_INVALID: ResultCode = ResultCode {
    code: "PROVISIONING_BREAK_RECIPIENT_INVALID",
    module: MODULE_ACC,
    status: 400,
    message: "Provisioning break recipient [{recipient}] must reference exactly one identity or role.",
};

pub const PROVISIONING_BREAK_GLOBAL_CONFIG_SAVE: ResultCode = ResultCode {
    code: "PROVISIONING_BREAK_GLOBAL_CONFIG_SAVE",
    module: MODULE_ACC,
    status: 400,
    message: "Global provisioning break configuration for operation [{operationType}] is read from configuration properties and cannot be saved.",
};
